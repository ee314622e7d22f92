use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{self, BufRead, Write};

/// Persisted representation of spilled records.
///
/// Records written by `write_record` must come back from `read_record` in
/// the same order and unchanged, since spilled records are re-keyed on the
/// way back; `read_record` returns `None` at the end of the chunk.
pub trait SpillCodec<T> {
    fn write_record<W: Write>(&self, writer: &mut W, record: &T) -> io::Result<()>;

    fn read_record<R: BufRead>(&self, reader: &mut R) -> io::Result<Option<T>>;
}

/// Compact binary records via bincode's serde support. Lossless for any
/// type whose `Deserialize` does not rely on `deserialize_any`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl<T> SpillCodec<T> for BincodeCodec
where
    T: Serialize + DeserializeOwned,
{
    fn write_record<W: Write>(&self, writer: &mut W, record: &T) -> io::Result<()> {
        let config = bincode::config::standard();
        bincode::serde::encode_into_std_write(record, writer, config).map_err(io::Error::other)?;
        Ok(())
    }

    fn read_record<R: BufRead>(&self, reader: &mut R) -> io::Result<Option<T>> {
        if reader.fill_buf()?.is_empty() {
            return Ok(None);
        }

        let config = bincode::config::standard();
        let record = bincode::serde::decode_from_std_read(reader, config).map_err(io::Error::other)?;
        Ok(Some(record))
    }
}

/// One `serde_json` document per line.
///
/// Suited to self-describing records such as `serde_json::Value`. JSON has no
/// NaN or infinities and writes `Some(None)` as `null`, so records holding
/// either do not survive a spill; use [`BincodeCodec`] for those.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesCodec;

impl<T> SpillCodec<T> for JsonLinesCodec
where
    T: Serialize + DeserializeOwned,
{
    fn write_record<W: Write>(&self, writer: &mut W, record: &T) -> io::Result<()> {
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")
    }

    fn read_record<R: BufRead>(&self, reader: &mut R) -> io::Result<Option<T>> {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }

        let record = serde_json::from_str(line.trim_end())?;
        Ok(Some(record))
    }
}
