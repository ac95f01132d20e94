//! MongoDB driver adapter backed by the official `mongodb` crate.

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::Client;

use super::{ConnectionOptions, DatabaseDriver, DriverResult};

/// [`DatabaseDriver`] that talks to a real MongoDB deployment.
///
/// Each handle is a dedicated [`Client`] with its own connection pool, so an
/// ephemeral borrow never shares sockets with the persistent one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoDriver;

impl MongoDriver {
    pub fn new() -> Self {
        Self
    }

    fn apply_options(client_options: &mut ClientOptions, options: &ConnectionOptions) {
        if let Some(app_name) = &options.app_name {
            client_options.app_name = Some(app_name.clone());
        }
        if let Some(timeout) = options.connect_timeout {
            client_options.connect_timeout = Some(timeout);
        }
        if let Some(timeout) = options.server_selection_timeout {
            client_options.server_selection_timeout = Some(timeout);
        }
        if let Some(direct) = options.direct_connection {
            client_options.direct_connection = Some(direct);
        }
    }
}

#[async_trait]
impl DatabaseDriver for MongoDriver {
    type Handle = Client;

    async fn open(&self, uri: &str, options: &ConnectionOptions) -> DriverResult<Client> {
        let mut client_options = ClientOptions::parse(uri).await?;
        Self::apply_options(&mut client_options, options);

        let client = Client::with_options(client_options)?;

        // Clients connect lazily; ping so an unreachable server fails here.
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;

        Ok(client)
    }

    async fn list_database_names(&self, handle: &Client) -> DriverResult<Vec<String>> {
        Ok(handle.list_database_names().await?)
    }

    async fn list_collection_names(&self, handle: &Client, database: &str) -> DriverResult<Vec<String>> {
        Ok(handle.database(database).list_collection_names().await?)
    }

    async fn close(&self, handle: &Client) -> DriverResult<()> {
        handle.clone().shutdown().await;
        Ok(())
    }
}
