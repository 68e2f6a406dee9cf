//! HTML Batch Example
//!
//! Sends the same HTML newsletter to several recipients over implicit TLS,
//! one connection per message, and reports each outcome through callbacks.

use integrations_mail::{
    Callbacks, ConnectionConfig, Credentials, Dispatcher, HostnameResolver, MailError,
    MimeContent, OutgoingMessage,
};

#[tokio::main]
async fn main() -> Result<(), MailError> {
    let config = ConnectionConfig {
        host: "smtp.example.com".into(),
        port: 465,
        use_ssl: true,
        local_hostname: Some("newsletter.example.com".into()),
        ..Default::default()
    };
    config.validate()?;

    let resolver = HostnameResolver::system();
    let dispatcher = Dispatcher::new(config, &resolver).await?;

    let html = MimeContent::html(
        "<h1>October update</h1><p>Release notes are <a href=\"https://example.com\">online</a>.</p>",
    )?;

    let recipients = ["alice@example.com", "bob@example.com", "carol@example.com"];
    let messages = recipients
        .iter()
        .map(|to| {
            OutgoingMessage::builder()
                .subject("October update")
                .content(html.clone())
                .from("News <news@example.com>")
                .to(*to)
                .build()
        })
        .collect::<Result<Vec<_>, _>>()?;

    let hooks = Callbacks::new()
        .on_success(|id| println!("  delivered {}", id))
        .on_failure(|e| eprintln!("  failed: {}", e));

    let credentials = Credentials::new("news@example.com", "your-password");
    let result = dispatcher
        .send_batch_with(Some(&credentials), &messages, &hooks)
        .await;

    println!(
        "Batch finished in {:?}: {}/{} delivered",
        result.duration, result.succeeded, result.total
    );

    let snapshot = dispatcher.metrics().snapshot();
    println!("Success rate: {:.0}%", snapshot.success_rate() * 100.0);

    Ok(())
}
