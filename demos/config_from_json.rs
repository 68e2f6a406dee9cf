//! Configuration From JSON Example
//!
//! Loads a connection configuration from JSON (durations in humantime
//! format), prints the session properties it produces and the transport
//! settings read back from them. Nothing is sent.

use integrations_mail::{ConnectionConfig, MailError, SessionSettings};

const CONFIG: &str = r#"{
    "host": "smtp.example.com",
    "port": 587,
    "use_tls": true,
    "connection_timeout": "10s",
    "read_timeout": "1m",
    "debug": true,
    "local_hostname": "app01.example.com",
    "extra_properties": {
        "mail.smtp.ssl.trust": "smtp.example.com"
    }
}"#;

fn main() -> Result<(), MailError> {
    let config: ConnectionConfig = serde_json::from_str(CONFIG)
        .map_err(|e| MailError::configuration("invalid configuration JSON").with_cause(e))?;
    config.validate()?;

    let hostname = config.local_hostname.as_deref().unwrap_or("localhost.localdomain");
    let properties = config.session_properties(hostname);

    println!("Session properties for {}:", config.address());
    print!("{}", properties);

    let settings = SessionSettings::from_properties(&properties)?;
    println!("Transport settings: {:#?}", settings);

    Ok(())
}
