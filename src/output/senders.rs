use async_trait::async_trait;
use log::{debug, error};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::utils::error::ModbusError;

#[async_trait]
pub trait DataSender: Send + Sync {
    async fn send(&self, data: &str) -> Result<(), ModbusError>;
    fn sender_type(&self) -> &str;
    fn destination(&self) -> &str;
}

pub struct ConsoleSender;

#[async_trait]
impl DataSender for ConsoleSender {
    async fn send(&self, data: &str) -> Result<(), ModbusError> {
        println!("{}", data);
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "console"
    }

    fn destination(&self) -> &str {
        "stdout"
    }
}

/// Appends one record per line, so repeated runs build up a log.
pub struct FileSender {
    file_path: String,
    header: Option<String>,
}

impl FileSender {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_string_lossy().to_string(),
            header: None,
        }
    }

    /// Written once, when the file is created empty.
    pub fn with_header(mut self, header: String) -> Self {
        if !header.is_empty() {
            self.header = Some(header);
        }
        self
    }
}

#[async_trait]
impl DataSender for FileSender {
    async fn send(&self, data: &str) -> Result<(), ModbusError> {
        debug!("📝 Appending {} bytes to {}", data.len(), self.file_path);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .map_err(|e| {
                error!("❌ Failed to open file {}: {}", self.file_path, e);
                ModbusError::CommunicationError(format!("File open error: {}", e))
            })?;

        let is_empty = file.metadata().map(|m| m.len() == 0).unwrap_or(false);
        if let (true, Some(header)) = (is_empty, &self.header) {
            writeln!(file, "{}", header)?;
        }

        writeln!(file, "{}", data).map_err(|e| {
            error!("❌ Failed to write to file {}: {}", self.file_path, e);
            ModbusError::CommunicationError(format!("File write error: {}", e))
        })?;

        Ok(())
    }

    fn sender_type(&self) -> &str {
        "file"
    }

    fn destination(&self) -> &str {
        &self.file_path
    }
}
