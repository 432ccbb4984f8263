use std::error::Error;
use termlink::{ConnectionError, TermLinkError, TermLinkResult, TransportError};

/// Error handling and resilience tests
#[cfg(test)]
mod error_handling_tests {
    use super::*;

    #[test]
    fn test_error_types() {
        let errors = vec![
            TermLinkError::Config {
                message: "Config error".to_string(),
            },
            TermLinkError::Connection(ConnectionError::NotConnected),
            TermLinkError::Connection(ConnectionError::AlreadyConnected),
            TermLinkError::Connection(ConnectionError::ReconnectExhausted { attempts: 3 }),
            TermLinkError::Connection(TransportError::PortNotFound("COM3".into()).into()),
            TermLinkError::InvalidInput("Invalid input".to_string()),
            TermLinkError::Output("Output error".to_string()),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty(), "Error display should not be empty");
        }

        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TermLinkError>();
        assert_send_sync::<ConnectionError>();
        assert_send_sync::<TransportError>();
    }

    #[test]
    fn test_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let termlink_error: TermLinkError = io_error.into();
        assert!(matches!(termlink_error, TermLinkError::Io(_)));

        let transport = TransportError::WriteFailed("broken pipe".into());
        let connection: ConnectionError = transport.clone().into();
        assert_eq!(connection, ConnectionError::Transport(transport));

        let termlink_error: TermLinkError = connection.into();
        assert!(matches!(
            termlink_error,
            TermLinkError::Connection(ConnectionError::Transport(_))
        ));
    }

    #[test]
    fn test_transport_error_shows_through_connection_error() {
        let error: TermLinkError =
            ConnectionError::from(TransportError::NetworkTimeout("10.0.0.1:23".into())).into();
        assert_eq!(error.to_string(), "Network timeout connecting to 10.0.0.1:23");
    }

    #[test]
    fn test_error_kinds_are_stable() {
        let cases = [
            (ConnectionError::Configuration("x".into()), "configuration"),
            (ConnectionError::AlreadyConnected, "already_connected"),
            (ConnectionError::NotConnected, "not_connected"),
            (ConnectionError::Shutdown, "shutdown"),
            (ConnectionError::Cancelled, "cancelled"),
            (ConnectionError::ReconnectExhausted { attempts: 1 }, "reconnect_exhausted"),
            (TransportError::PermissionDenied("/dev/ttyS0".into()).into(), "permission_denied"),
            (TransportError::AddressInUse("0.0.0.0:80".into()).into(), "address_in_use"),
            (TransportError::UnexpectedClose("eof".into()).into(), "unexpected_close"),
        ];

        for (error, kind) in cases {
            assert_eq!(error.kind(), kind);
            assert_eq!(error.info().kind, kind);
        }
    }

    #[test]
    fn test_error_info_serializes() {
        let info = ConnectionError::NotConnected.info();
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["kind"], "not_connected");
        assert_eq!(json["detail"], "Device not connected");
    }

    #[test]
    fn test_result_type() {
        fn success_function() -> TermLinkResult<String> {
            Ok("success".to_string())
        }

        fn error_function() -> TermLinkResult<String> {
            Err(TermLinkError::Config {
                message: "Test error".to_string(),
            })
        }

        assert_eq!(success_function().unwrap(), "success");

        let error = error_function();
        assert!(error.is_err());
        assert!(error.unwrap_err().to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_chain() {
        let root_cause = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Access denied");
        let error: TermLinkError = root_cause.into();

        let mut current_error: &dyn Error = &error;
        let mut depth = 0;
        while let Some(source) = current_error.source() {
            current_error = source;
            depth += 1;
            if depth > 10 {
                break;
            }
        }

        assert!(depth > 0, "Should have at least one source error");
    }

    #[tokio::test]
    async fn test_async_error_propagation() {
        async fn failing_send() -> Result<(), ConnectionError> {
            Err(ConnectionError::NotConnected)
        }

        async fn calling_function() -> TermLinkResult<()> {
            failing_send().await?;
            Ok(())
        }

        let error = calling_function().await.unwrap_err();
        assert!(matches!(
            error,
            TermLinkError::Connection(ConnectionError::NotConnected)
        ));
        assert!(error.to_string().contains("not connected"));
    }

    #[test]
    fn test_error_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let error = Arc::new(TermLinkError::Config {
            message: "Thread safety test".to_string(),
        });

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let error_clone = Arc::clone(&error);
                thread::spawn(move || {
                    let display = format!("Thread {}: {}", i, error_clone);
                    assert!(display.contains("Thread safety test"));
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("Thread panicked");
        }
    }

    #[test]
    fn test_error_size() {
        use std::mem;

        let error_size = mem::size_of::<TermLinkError>();
        assert!(error_size <= 128, "TermLinkError too large: {} bytes", error_size);
    }
}
