//! Mutation commands and the bus that carries them to the view folder

use crate::core::record::{Invoice, RecordId};
use crate::error::{Error, Result};
use tokio::sync::mpsc;

/// Mutation intent applied to the materialized collection
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Append a record; the customer is resolved when the command is folded
    Add(Invoice),
    /// Remove the record with this id, if present
    Delete(RecordId),
}

impl Command {
    /// Id of the record this command targets
    pub fn target(&self) -> RecordId {
        match self {
            Command::Add(invoice) => invoice.id,
            Command::Delete(id) => *id,
        }
    }
}

/// Sending half of the command stream.
///
/// Add and Delete share one channel so that the folder observes them in the
/// exact order they were sent.
#[derive(Debug, Clone)]
pub struct CommandBus {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandBus {
    /// Create a bus and the receiver the folder drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Push a command onto the bus
    pub fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|e| Error::Closed(format!("command bus dropped {:?}", e.0)))
    }

    pub fn add(&self, invoice: Invoice) -> Result<()> {
        self.send(Command::Add(invoice))
    }

    pub fn delete(&self, id: RecordId) -> Result<()> {
        self.send(Command::Delete(id))
    }
}
