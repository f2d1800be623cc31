// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Echo provider
//!
//! Writes every statement it is asked to run to a writer instead of a
//! database, turning a migration run into a readable SQL script.

use async_trait::async_trait;
use std::io::Write;
use std::sync::{Arc, Mutex};

use super::{ConnectionFactory, DatabaseConnection};
use crate::catalog::Connection;
use crate::errors::{SqlstageError, SqlstageResult};

type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// Factory for connections that echo statements
#[derive(Clone)]
pub struct EchoConnectionFactory {
    writer: SharedWriter,
}

impl EchoConnectionFactory {
    /// Echo to a shared writer
    pub fn new(writer: SharedWriter) -> Self {
        Self { writer }
    }

    /// Echo to standard output
    pub fn stdout() -> Self {
        Self::new(Arc::new(Mutex::new(std::io::stdout())))
    }
}

#[async_trait]
impl ConnectionFactory for EchoConnectionFactory {
    async fn create_connection(&self, descriptor: &Connection) -> SqlstageResult<Box<dyn DatabaseConnection>> {
        Ok(Box::new(EchoConnection {
            name: descriptor.name.clone(),
            writer: Arc::clone(&self.writer),
            in_transaction: false,
        }))
    }
}

struct EchoConnection {
    name: String,
    writer: SharedWriter,
    in_transaction: bool,
}

impl EchoConnection {
    fn emit(&self, text: &str) -> SqlstageResult<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| SqlstageError::database("echo writer lock poisoned"))?;
        writeln!(writer, "{}", text).map_err(SqlstageError::database)
    }
}

#[async_trait]
impl DatabaseConnection for EchoConnection {
    async fn open(&mut self) -> SqlstageResult<()> {
        self.emit(&format!("-- connection '{}' opened", self.name))
    }

    async fn begin_transaction(&mut self) -> SqlstageResult<()> {
        if self.in_transaction {
            return Err(SqlstageError::database("transaction already open"));
        }
        self.in_transaction = true;
        self.emit("BEGIN TRANSACTION;")
    }

    async fn commit(&mut self) -> SqlstageResult<()> {
        if !self.in_transaction {
            return Err(SqlstageError::database("no open transaction"));
        }
        self.in_transaction = false;
        self.emit("COMMIT;")
    }

    async fn rollback(&mut self) -> SqlstageResult<()> {
        self.in_transaction = false;
        self.emit("ROLLBACK;")
    }

    async fn execute(&mut self, batch: &str) -> SqlstageResult<u64> {
        self.emit(batch)?;
        self.emit("")?;
        Ok(0)
    }

    async fn close(&mut self) -> SqlstageResult<()> {
        if self.in_transaction {
            self.rollback().await?;
        }
        self.emit(&format!("-- connection '{}' closed", self.name))
    }
}
