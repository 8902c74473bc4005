use std::io::{Read, Write};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};

use crate::{Error, Nbt, io_adaptor::ReadAdaptor};

/// Reads a gzipped, named NBT root from any reader.
pub fn read_gzip_nbt(input: impl Read) -> Result<Nbt, Error> {
    let decoder = GzDecoder::new(input);
    let mut reader = ReadAdaptor::new(decoder);
    Nbt::read(&mut reader)
}

/// Writes `nbt` (with its root name) through a gzip encoder.
pub fn write_gzip_nbt(nbt: &Nbt, output: impl Write) -> Result<(), Error> {
    let mut encoder = GzEncoder::new(output, Compression::default());
    nbt.write_to_writer(&mut encoder)?;
    encoder.finish().map_err(Error::Incomplete)?;
    Ok(())
}

pub fn write_gzip_nbt_to_bytes(nbt: &Nbt) -> Result<Vec<u8>, Error> {
    let mut buffer = Vec::new();
    write_gzip_nbt(nbt, &mut buffer)?;
    Ok(buffer)
}
