use deadpool::managed::{self, Pool, RecycleError, RecycleResult};
use libsql::{Connection, Database, Error as LibsqlError};

/// Hands out connections to one local libsql database
pub struct LibsqlManager {
    database: Database,
}

impl LibsqlManager {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

impl managed::Manager for LibsqlManager {
    type Type = Connection;
    type Error = LibsqlError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        self.database.connect()
    }

    async fn recycle(
        &self,
        conn: &mut Self::Type,
        _: &managed::Metrics,
    ) -> RecycleResult<Self::Error> {
        let row = conn.query("SELECT 1", ()).await?.next().await?;
        match row {
            Some(row) if row.get::<i64>(0)? == 1 => Ok(()),
            _ => Err(RecycleError::Message("connection health query returned no rows".into())),
        }
    }
}

pub type LibsqlPool = Pool<LibsqlManager>;
