//! Integration tests for the mail dispatcher.

#[cfg(test)]
mod dispatcher_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use integrations_mail::mocks::{
        HookEvent, MockTransport, RecordingHooks, StaticExternalIp, StaticPtrLookup,
        StaticReverseLookup,
    };
    use integrations_mail::{
        Callbacks, ConnectionConfig, Credentials, Dispatcher, HostnameResolver, MailError,
        MailErrorKind, MimeContent, OutgoingMessage,
    };
    use tokio_test::{assert_err, assert_ok};

    fn resolver() -> HostnameResolver {
        HostnameResolver::new(
            Arc::new(StaticExternalIp::ok("203.0.113.7")),
            Some(Arc::new(StaticPtrLookup::failing())),
            Arc::new(StaticReverseLookup::ok("host-203-0-113-7.example.net")),
        )
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig::builder("smtp.example.com", 587)
            .tls(true)
            .build()
            .unwrap()
    }

    fn message(to: &str) -> OutgoingMessage {
        OutgoingMessage::parse(
            "Build finished",
            MimeContent::text("All green.").unwrap(),
            "ci@example.com",
            &[to],
            &[],
            &["archive@example.com"],
        )
        .unwrap()
    }

    async fn dispatcher(transport: Arc<MockTransport>) -> Dispatcher {
        Dispatcher::with_transport(config(), &resolver(), transport)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_success_fires_success_hook_once() {
        let transport = Arc::new(MockTransport::new());
        let dispatcher = dispatcher(transport.clone()).await;
        let hooks = RecordingHooks::new();

        let id = dispatcher
            .send_with(None, &message("dev@example.com"), &hooks)
            .await
            .unwrap();

        assert_eq!(hooks.events(), vec![HookEvent::Success(id.clone())]);
        assert_eq!(hooks.failure_count(), 0);
        assert_eq!(transport.submission_count(), 1);
        assert!(transport.submissions()[0].message_text().contains(&id));
        assert_eq!(dispatcher.metrics().snapshot().messages_sent, 1);
    }

    #[tokio::test]
    async fn test_failure_fires_failure_hook_once_and_returns_error() {
        let transport = Arc::new(MockTransport::new());
        transport.reject_next(550, "mailbox unavailable");
        let dispatcher = dispatcher(transport.clone()).await;
        let hooks = RecordingHooks::new();

        let err = dispatcher
            .send_with(None, &message("nobody@example.com"), &hooks)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), MailErrorKind::Transport);
        assert_eq!(err.smtp_code(), Some(550));
        assert!(err.is_permanent());
        assert_eq!(
            hooks.events(),
            vec![HookEvent::Failure {
                kind: MailErrorKind::Transport,
                smtp_code: Some(550),
                message: "mailbox unavailable".to_string(),
            }]
        );
        assert!(hooks.successes().is_empty());
        assert_eq!(dispatcher.metrics().snapshot().messages_failed, 1);
    }

    #[tokio::test]
    async fn test_callbacks_receive_outcome() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_next_with(MailError::transport("connection reset"));
        let dispatcher = dispatcher(transport).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let failures = Arc::new(AtomicUsize::new(0));
        let hooks = {
            let seen = seen.clone();
            let failures = failures.clone();
            Callbacks::new()
                .on_success(move |id| seen.lock().unwrap().push(id.to_string()))
                .on_failure(move |_| {
                    failures.fetch_add(1, Ordering::SeqCst);
                })
        };

        assert_err!(dispatcher.send_with(None, &message("a@example.com"), &hooks).await);
        let id = assert_ok!(dispatcher.send_with(None, &message("b@example.com"), &hooks).await);

        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_per_call_overlay_leaves_base_untouched() {
        let transport = Arc::new(MockTransport::new());
        let dispatcher = dispatcher(transport.clone()).await;
        let credentials = Credentials::new("ci", "secret");

        assert_ok!(dispatcher.send(Some(&credentials), &message("dev@example.com")).await);
        assert_ok!(dispatcher.send(None, &message("dev@example.com")).await);

        let submissions = transport.submissions();
        assert_eq!(submissions[0].username.as_deref(), Some("ci"));
        assert!(submissions[0].session.get_bool("mail.smtp.auth"));
        assert_eq!(submissions[0].session.get("mail.smtp.from"), Some("ci@example.com"));
        assert_eq!(submissions[1].username, None);
        assert!(!submissions[1].session.get_bool("mail.smtp.auth"));

        let base = dispatcher.session_properties();
        assert!(!base.contains_key("mail.smtp.auth"));
        assert!(!base.contains_key("mail.smtp.from"));
    }

    #[tokio::test]
    async fn test_envelope_includes_bcc() {
        let transport = Arc::new(MockTransport::new());
        let dispatcher = dispatcher(transport.clone()).await;

        assert_ok!(dispatcher.send(None, &message("dev@example.com")).await);

        let submission = &transport.submissions()[0];
        assert_eq!(submission.envelope_from.as_deref(), Some("ci@example.com"));
        assert_eq!(
            submission.envelope_to,
            vec!["dev@example.com".to_string(), "archive@example.com".to_string()]
        );
        assert!(!submission.message_text().contains("archive@example.com"));
    }

    #[tokio::test]
    async fn test_resolved_hostname_becomes_localhost_property() {
        let dispatcher = dispatcher(Arc::new(MockTransport::new())).await;

        assert_eq!(
            dispatcher.session_properties().get("mail.smtp.localhost"),
            Some("host-203-0-113-7.example.net")
        );
        assert_eq!(dispatcher.metrics().snapshot().hostname_fallbacks, 0);
    }

    #[tokio::test]
    async fn test_explicit_local_hostname_skips_resolver() {
        let ip = Arc::new(StaticExternalIp::failing());
        let resolver = HostnameResolver::new(ip.clone(), None, Arc::new(StaticReverseLookup::failing()));
        let config = ConnectionConfig {
            local_hostname: Some("relay.internal".into()),
            ..config()
        };

        let dispatcher = Dispatcher::with_transport(config, &resolver, Arc::new(MockTransport::new()))
            .await
            .unwrap();

        assert_eq!(dispatcher.session_properties().get("mail.smtp.localhost"), Some("relay.internal"));
        assert_eq!(ip.calls(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_ip_service_counts_fallback() {
        let resolver = HostnameResolver::new(
            Arc::new(StaticExternalIp::failing()),
            None,
            Arc::new(StaticReverseLookup::failing()),
        );

        let dispatcher = Dispatcher::with_transport(config(), &resolver, Arc::new(MockTransport::new()))
            .await
            .unwrap();

        assert_eq!(
            dispatcher.session_properties().get("mail.smtp.localhost"),
            Some("localhost.localdomain")
        );
        assert_eq!(dispatcher.metrics().snapshot().hostname_fallbacks, 1);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = ConnectionConfig {
            host: String::new(),
            ..Default::default()
        };

        let err = Dispatcher::with_transport(config, &resolver(), Arc::new(MockTransport::new()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_batch_continues_after_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.reject_next(451, "try again later");
        let dispatcher = dispatcher(transport.clone()).await;
        let hooks = RecordingHooks::new();

        let messages = vec![
            message("a@example.com"),
            message("b@example.com"),
            message("c@example.com"),
        ];
        let result = dispatcher.send_batch_with(None, &messages, &hooks).await;

        assert_eq!(result.total, 3);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 1);
        assert!(!result.is_complete_success());
        assert_eq!(result.message_ids().count(), 2);
        assert_eq!(result.failures().next().unwrap().smtp_code(), Some(451));
        assert!(!result.failures().next().unwrap().is_permanent());

        assert_eq!(transport.submission_count(), 3);
        assert_eq!(hooks.successes().len(), 2);
        assert_eq!(hooks.failure_count(), 1);
    }

    #[tokio::test]
    async fn test_dispatchers_with_same_config_are_equal() {
        let a = dispatcher(Arc::new(MockTransport::new())).await;
        let b = dispatcher(Arc::new(MockTransport::new())).await;
        assert_eq!(a, b);

        let c = Dispatcher::with_transport(
            ConnectionConfig { use_ssl: true, port: 465, ..config() },
            &resolver(),
            Arc::new(MockTransport::new()),
        )
        .await
        .unwrap();
        assert_ne!(a, c);
    }

    #[tokio::test]
    #[ignore] // Only run with SMTP_HOST set
    async fn test_live_send() {
        let host = std::env::var("SMTP_HOST").expect("SMTP_HOST must be set");
        let to = std::env::var("SMTP_TO").expect("SMTP_TO must be set");
        let config = ConnectionConfig::builder(host, 25)
            .local_hostname("localhost")
            .build()
            .unwrap();

        let dispatcher = Dispatcher::new(config, &HostnameResolver::system()).await.unwrap();
        assert_ok!(dispatcher.send(None, &message(&to)).await);
    }
}
