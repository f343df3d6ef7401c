use std::path::Path;

use csv::ByteRecord;
use encoding_rs::Encoding;
use log::debug;

use crate::{error::PipelineError, io_utils};

/// Reads only the first record of `path` and returns it as the ordered raw column names.
///
/// The reader is dropped before returning; the load phase opens its own.
pub fn read_header(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<Vec<String>, PipelineError> {
    let unreadable = |source: anyhow::Error| PipelineError::SourceUnreadable {
        path: path.to_path_buf(),
        source: source.into(),
    };

    let mut reader = io_utils::open_source_reader(path, delimiter).map_err(unreadable)?;
    let mut record = ByteRecord::new();
    let has_record = reader
        .read_byte_record(&mut record)
        .map_err(|err| unreadable(anyhow::Error::new(err).context("Reading header record")))?;
    if !has_record {
        return Err(PipelineError::EmptySource {
            path: path.to_path_buf(),
        });
    }

    let mut header = io_utils::decode_record(&record, encoding).map_err(unreadable)?;
    if let Some(first) = header.first_mut() {
        if let Some(stripped) = first.strip_prefix('\u{feff}') {
            *first = stripped.to_string();
        }
    }
    debug!("Header of {:?}: {:?}", path, header);
    Ok(header)
}
