//! Request-scoped logging context.
//!
//! Each `/v1/messages` call runs inside a [`REQUEST_ID`] scope so that every log
//! line emitted while serving it, including the spawned stream pump, can carry
//! the same identifier without threading it through every function call.

tokio::task_local! {
    /// Task-local storage for the current request ID.
    pub static REQUEST_ID: String;
}

/// Get the current request ID from context, if set.
///
/// Returns an empty string if no request ID is set.
pub fn get_request_id() -> String {
    REQUEST_ID.try_with(|id| id.clone()).unwrap_or_default()
}

/// Generate a new unique request ID using UUID v4.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Execute an async block with the request ID in scope.
///
/// # Example
///
/// ```ignore
/// with_request_context!(request_id, async {
///     // handler logic here
/// })
/// ```
#[macro_export]
macro_rules! with_request_context {
    ($request_id:expr, $body:expr) => {
        $crate::core::logging::REQUEST_ID
            .scope($request_id, $body)
            .await
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_id_get() {
        REQUEST_ID
            .scope("req-1".to_string(), async {
                assert_eq!(get_request_id(), "req-1");
            })
            .await;
    }

    #[tokio::test]
    async fn test_request_id_default_outside_scope() {
        assert_eq!(get_request_id(), "");
    }

    #[tokio::test]
    async fn test_request_id_isolation() {
        let task1 = tokio::spawn(async {
            REQUEST_ID
                .scope("a".to_string(), async {
                    tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
                    get_request_id()
                })
                .await
        });
        let task2 = tokio::spawn(async {
            REQUEST_ID
                .scope("b".to_string(), async {
                    tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
                    get_request_id()
                })
                .await
        });

        assert_eq!(task1.await.unwrap(), "a");
        assert_eq!(task2.await.unwrap(), "b");
    }

    #[tokio::test]
    async fn test_with_request_context_macro() {
        let seen = crate::with_request_context!("req-9".to_string(), async { get_request_id() });
        assert_eq!(seen, "req-9");
    }

    #[test]
    fn test_generate_request_id_unique() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
