//! Provider base for stored-procedure backed data access.
//!
//! A [`Provider`] owns a connector and an [`InstrumentedExecutor`]. Each call
//! builds a fresh [`CommandDescriptor`], opens a connection, runs the command,
//! maps rows through the caller's projection and closes the connection again,
//! whether the call succeeded or not.
//!
//! ```no_run
//! # use building_blocks::db::{Parameter, Provider};
//! # async fn demo(provider: &Provider) -> building_blocks::error::Result<()> {
//! let names = provider
//!     .get(
//!         "pkg_card.get_cards",
//!         [Parameter::input("p_customer_id", 42i64)],
//!         "p_cursor",
//!         |row| row.require_string("card_name"),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

use crate::db::command::{CommandDescriptor, Parameter};
use crate::db::connection::{Connection, Connector};
use crate::db::executor::InstrumentedExecutor;
use crate::db::record::DataRecord;
use crate::db::types::DbValue;
use crate::error::{Error, Result};

pub struct Provider {
    connector: Arc<dyn Connector>,
    executor: InstrumentedExecutor,
    runtime: Option<Handle>,
}

impl Provider {
    /// Create a provider; captures the current runtime handle when there is one.
    pub fn new(connector: Arc<dyn Connector>, executor: InstrumentedExecutor) -> Self {
        Self {
            connector,
            executor,
            runtime: Handle::try_current().ok(),
        }
    }

    /// Runtime used by the `*_blocking` variants.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn executor(&self) -> &InstrumentedExecutor {
        &self.executor
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    /// Call a stored procedure and project every row of its output cursor.
    pub async fn get<T, F>(
        &self,
        command_text: &str,
        parameters: impl IntoIterator<Item = Parameter>,
        output_cursor: &str,
        projection: F,
    ) -> Result<Vec<T>>
    where
        F: FnMut(&DataRecord) -> Result<T> + Send,
        T: Send,
    {
        if output_cursor.trim().is_empty() {
            return Err(Error::invalid_argument(
                "output_cursor",
                "output cursor name must not be blank",
            ));
        }
        let command = CommandDescriptor::procedure(command_text)
            .with_parameters(parameters)
            .with_output_cursor(output_cursor);
        self.query(command, projection).await
    }

    /// Blocking form of [`Provider::get`].
    ///
    /// Must not be called from inside an async context.
    pub fn get_blocking<T, F>(
        &self,
        command_text: &str,
        parameters: impl IntoIterator<Item = Parameter>,
        output_cursor: &str,
        projection: F,
    ) -> Result<Vec<T>>
    where
        F: FnMut(&DataRecord) -> Result<T> + Send,
        T: Send,
    {
        let handle = self.blocking_handle()?;
        handle.block_on(self.get(command_text, parameters, output_cursor, projection))
    }

    /// Run ad-hoc SQL text and project every returned row.
    pub async fn get_text<T, F>(
        &self,
        sql: &str,
        parameters: impl IntoIterator<Item = Parameter>,
        projection: F,
    ) -> Result<Vec<T>>
    where
        F: FnMut(&DataRecord) -> Result<T> + Send,
        T: Send,
    {
        let command = CommandDescriptor::text(sql).with_parameters(parameters);
        self.query(command, projection).await
    }

    /// Call a stored procedure and return the affected row count.
    pub async fn execute_non_query(
        &self,
        command_text: &str,
        parameters: impl IntoIterator<Item = Parameter>,
    ) -> Result<u64> {
        let command = CommandDescriptor::procedure(command_text).with_parameters(parameters);
        command.validate()?;

        let mut connection = self.open(&command).await?;
        let result = self
            .executor
            .execute_non_query(connection.as_mut(), &command)
            .await;
        let closed = connection.close().await;

        let affected = result.map_err(|e| Error::provider(command.formatted(), e))?;
        closed.map_err(|e| Error::provider(command.formatted(), e))?;
        debug!(command = %command.text, affected, "Non-query completed");
        Ok(affected)
    }

    /// Blocking form of [`Provider::execute_non_query`].
    pub fn execute_non_query_blocking(
        &self,
        command_text: &str,
        parameters: impl IntoIterator<Item = Parameter>,
    ) -> Result<u64> {
        let handle = self.blocking_handle()?;
        handle.block_on(self.execute_non_query(command_text, parameters))
    }

    /// Call a stored function and return its single value.
    pub async fn execute_scalar(
        &self,
        command_text: &str,
        parameters: impl IntoIterator<Item = Parameter>,
    ) -> Result<DbValue> {
        let command = CommandDescriptor::procedure(command_text).with_parameters(parameters);
        command.validate()?;

        let mut connection = self.open(&command).await?;
        let result = self
            .executor
            .execute_scalar(connection.as_mut(), &command)
            .await;
        let closed = connection.close().await;

        let value = result.map_err(|e| Error::provider(command.formatted(), e))?;
        closed.map_err(|e| Error::provider(command.formatted(), e))?;
        Ok(value)
    }

    async fn open(&self, command: &CommandDescriptor) -> Result<Box<dyn Connection>> {
        self.executor
            .open(self.connector.as_ref())
            .await
            .map_err(|e| Error::provider(command.formatted(), e))
    }

    async fn query<T, F>(&self, command: CommandDescriptor, projection: F) -> Result<Vec<T>>
    where
        F: FnMut(&DataRecord) -> Result<T> + Send,
        T: Send,
    {
        command.validate()?;

        let mut connection = self.open(&command).await?;
        let result = self
            .read_all(connection.as_mut(), &command, projection)
            .await;
        let closed = connection.close().await;

        let rows = result.map_err(|e| Error::provider(command.formatted(), e))?;
        closed.map_err(|e| Error::provider(command.formatted(), e))?;
        debug!(command = %command.text, rows = rows.len(), "Query completed");
        Ok(rows)
    }

    /// Execute and drain the cursor; the cursor is dropped before returning.
    async fn read_all<T, F>(
        &self,
        connection: &mut dyn Connection,
        command: &CommandDescriptor,
        mut projection: F,
    ) -> Result<Vec<T>>
    where
        F: FnMut(&DataRecord) -> Result<T> + Send,
        T: Send,
    {
        let mut cursor = self.executor.execute_reader(connection, command).await?;
        let mut items = Vec::new();
        while let Some(record) = self.executor.read(cursor.as_mut(), command).await? {
            items.push(projection(&record)?);
        }
        Ok(items)
    }

    fn blocking_handle(&self) -> Result<&Handle> {
        if Handle::try_current().is_ok() {
            return Err(Error::unsupported(
                "blocking provider calls cannot run inside an async context; use the async variant",
            ));
        }
        self.runtime.as_ref().ok_or_else(|| {
            Error::config("provider has no runtime handle; construct it with with_runtime")
        })
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("connector", &self.connector.describe())
            .field("executor", &self.executor)
            .finish()
    }
}
