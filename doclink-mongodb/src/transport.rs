use std::time::Duration;

use async_trait::async_trait;
use bson::{Document, doc};
use mongodb::{
    Client,
    error::{Error as DriverError, ErrorKind},
    options::{ClientOptions, Credential, ServerAddress, Tls, TlsOptions},
};
use tracing::debug;

use doclink_core::{
    config::ClientConfig,
    error::ClientResult,
    transport::{Transport, TransportBuilder, TransportError},
};

/// Transport over the MongoDB async driver.
///
/// Every handle is a driver [`Client`] limited to one connection to the configured address,
/// so the core's pool decides how many connections exist.
#[derive(Debug, Default, Clone)]
pub struct MongoTransport;

impl MongoTransport {
    pub fn new() -> Self {
        Self
    }

    pub fn builder() -> MongoTransportBuilder {
        MongoTransportBuilder
    }
}

/// Maps the connection settings of a config generation onto driver options.
pub fn client_options(config: &ClientConfig) -> Result<ClientOptions, TransportError> {
    let address = ServerAddress::parse(&config.address)
        .map_err(|err| TransportError::Io(err.to_string()))?;
    let connect_timeout = Duration::from_millis(config.connect_timeout_ms);

    let mut options = ClientOptions::default();
    options.hosts = vec![address];
    options.app_name = config.app_name.clone();
    options.connect_timeout = Some(connect_timeout);
    options.server_selection_timeout = Some(connect_timeout);
    options.direct_connection = Some(true);
    options.max_pool_size = Some(1);
    options.tls = Some(if config.tls {
        Tls::Enabled(TlsOptions::default())
    } else {
        Tls::Disabled
    });
    options.credential = config.credential.as_ref().map(|credential| {
        let mut driver_credential = Credential::default();
        driver_credential.username = Some(credential.user.clone());
        driver_credential.password = Some(credential.password.clone());
        driver_credential.source = credential.source.clone();
        driver_credential
    });

    Ok(options)
}

/// Turns a driver error into either a server reply or a transport failure.
///
/// Command failures are rebuilt into the `ok: 0` reply the server sent, so the core maps them
/// the same way for every transport.
fn reply_from_error(err: DriverError) -> Result<Document, TransportError> {
    match err.kind.as_ref() {
        ErrorKind::Command(command_error) => Ok(doc! {
            "ok": 0.0,
            "code": command_error.code,
            "codeName": command_error.code_name.clone(),
            "errmsg": command_error.message.clone(),
        }),
        _ => Err(TransportError::Io(err.to_string())),
    }
}

#[async_trait]
impl Transport for MongoTransport {
    type Handle = Client;

    async fn open_session(&self, config: &ClientConfig) -> Result<Client, TransportError> {
        let client = Client::with_options(client_options(config)?)
            .map_err(|err| TransportError::Io(err.to_string()))?;

        // The driver connects lazily; a ping proves the address is reachable.
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|err| TransportError::Io(err.to_string()))?;
        debug!(address = %config.address, "opened driver session");

        Ok(client)
    }

    async fn send_command(
        &self,
        handle: &mut Client,
        database: &str,
        command: Document,
    ) -> Result<Document, TransportError> {
        match handle.database(database).run_command(command).await {
            Ok(reply) => Ok(reply),
            Err(err) => reply_from_error(err),
        }
    }

    async fn close_session(&self, handle: Client) {
        handle.shutdown().await;
    }
}

/// Builder for [`MongoTransport`] instances.
#[derive(Debug, Default)]
pub struct MongoTransportBuilder;

#[async_trait]
impl TransportBuilder for MongoTransportBuilder {
    type Transport = MongoTransport;

    async fn build(self) -> ClientResult<Self::Transport> {
        Ok(MongoTransport::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn maps_config_onto_single_connection_options() {
        let config = ClientConfig::builder()
            .address("db.internal:27018")
            .credential("app", "secret", Some("admin".to_string()))
            .tls(true)
            .connect_timeout_ms(250)
            .app_name("reports")
            .build()
            .unwrap();

        let options = client_options(&config).unwrap();

        assert_eq!(options.hosts.len(), 1);
        assert_eq!(options.hosts[0].to_string(), "db.internal:27018");
        assert_eq!(options.max_pool_size, Some(1));
        assert_eq!(options.direct_connection, Some(true));
        assert_eq!(options.connect_timeout, Some(Duration::from_millis(250)));
        assert_eq!(options.app_name.as_deref(), Some("reports"));
        assert!(matches!(options.tls, Some(Tls::Enabled(_))));

        let credential = options.credential.unwrap();
        assert_eq!(credential.username.as_deref(), Some("app"));
        assert_eq!(credential.source.as_deref(), Some("admin"));
    }

    #[test]
    fn rejects_unparseable_addresses() {
        let config = ClientConfig {
            address: "db.internal:notaport".to_string(),
            ..ClientConfig::default()
        };

        assert!(matches!(client_options(&config), Err(TransportError::Io(_))));
    }
}
