//! Pass-through copy of content to a local file.

use super::bulk::BulkTransfer;
use crate::content::{ContentHandle, ContentMetadata};
use crate::error::{BridgeResult, TransferError};
use log::info;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

const COPY_CHUNK_BYTES: usize = 64 * 1024;

impl BulkTransfer {
    /// Copies `handle` into `destination` without touching the arena.
    pub fn save_to_local_file(
        &self,
        handle: &ContentHandle,
        destination: &Path,
    ) -> BridgeResult<ContentMetadata> {
        let mut input = self.accessor.open_read_stream(handle)?;
        let file = File::create(destination).map_err(|err| local_file_error(destination, err))?;
        let mut output = BufWriter::new(file);

        let mut chunk = vec![0u8; COPY_CHUNK_BYTES];
        let mut copied = 0usize;
        loop {
            let read = match input.read(&mut chunk) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransferError::Read(err).into()),
            };
            output
                .write_all(&chunk[..read])
                .map_err(|err| local_file_error(destination, err))?;
            copied += read;
        }
        output
            .flush()
            .map_err(|err| local_file_error(destination, err))?;
        drop(input);

        info!("event=save_to_file module=transfer status=ok length={copied}");
        Ok(self.accessor.query_metadata(handle)?)
    }
}

fn local_file_error(destination: &Path, source: io::Error) -> TransferError {
    TransferError::LocalFile {
        path: destination.display().to_string(),
        source,
    }
}
