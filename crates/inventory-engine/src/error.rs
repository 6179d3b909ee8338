use error_types::ServiceError;

pub(crate) fn to_service_error(err: store::StoreError) -> ServiceError {
    match err {
        store::StoreError::NotFound(id) => ServiceError::NotFound {
            resource: "reservation",
            id: id.to_string(),
        },
        store::StoreError::NotFoundByIntentId(intent_id) => ServiceError::NotFound {
            resource: "reservation",
            id: intent_id,
        },
        store::StoreError::Conflict(id) => ServiceError::Conflict {
            message: format!("conflicting write on {id}"),
        },
        store::StoreError::DatabaseError(e) => ServiceError::from(e),
        store::StoreError::SerializationError(e) => ServiceError::fatal(e.to_string()),
    }
}
