//! Transparent compression for tabular files.
//!
//! Readers and writers are wrapped by the first registered [`CompressionCodec`]
//! matching the file extension; readers fall back to magic-byte sniffing, so a
//! gzip file without a `.gz` suffix still decodes.
//!
//! Built-in codecs, each behind a feature flag:
//! - **Gzip** (`.gz`, `.gzip`) via `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`.zst`, `.zstd`) via `zstd` (feature: `compression-zstd`)
//!
//! Custom codecs can be added with [`register_codec`].

use anyhow::{Context, Result, anyhow};
use std::io::{BufRead, BufReader, BufWriter, IntoInnerError, Read, Write};
use std::path::Path;
use std::sync::{Arc, OnceLock, RwLock};

type Registry = RwLock<Vec<Arc<dyn CompressionCodec>>>;

static CODEC_REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    CODEC_REGISTRY.get_or_init(|| RwLock::new(builtin_codecs()))
}

fn builtin_codecs() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
    ]
}

fn snapshot() -> Vec<Arc<dyn CompressionCodec>> {
    match registry().read() {
        Ok(codecs) => codecs.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Register a custom codec; it is consulted after the built-ins.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    match registry().write() {
        Ok(mut codecs) => codecs.push(codec),
        Err(poisoned) => poisoned.into_inner().push(codec),
    }
}

/// A pluggable compression algorithm.
pub trait CompressionCodec: Send + Sync {
    fn name(&self) -> &str;

    /// Lower-case extensions including the leading dot, e.g. `&[".gz"]`.
    fn extensions(&self) -> &[&str];

    /// Leading bytes identifying the format, if it has any.
    fn magic_bytes(&self) -> Option<&[u8]>;

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>>;

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn FinishWrite>>;
}

/// A writer that must be finished explicitly so trailing bytes (and their
/// write errors) are not left to `Drop`.
pub trait FinishWrite: Write {
    /// Write any trailer and flush the underlying writer.
    fn finish_dyn(self: Box<Self>) -> std::io::Result<()>;
}

impl<W: Write> FinishWrite for BufWriter<W> {
    fn finish_dyn(self: Box<Self>) -> std::io::Result<()> {
        let mut inner = (*self).into_inner().map_err(IntoInnerError::into_error)?;
        inner.flush()
    }
}

#[cfg(feature = "compression-gzip")]
impl<W: Write> FinishWrite for flate2::write::GzEncoder<W> {
    fn finish_dyn(self: Box<Self>) -> std::io::Result<()> {
        let mut inner = (*self).finish()?;
        inner.flush()
    }
}

#[cfg(feature = "compression-zstd")]
impl<W: Write> FinishWrite for zstd::stream::write::Encoder<'static, W> {
    fn finish_dyn(self: Box<Self>) -> std::io::Result<()> {
        let mut inner = (*self).finish()?;
        inner.flush()
    }
}

/// Extensions of every registered codec, used to recognise compressed tabular files.
pub fn known_extensions() -> Vec<String> {
    snapshot()
        .iter()
        .flat_map(|c| c.extensions().iter().map(|e| (*e).to_string()).collect::<Vec<_>>())
        .collect()
}

fn detect_from_extension(path: &Path) -> Option<Arc<dyn CompressionCodec>> {
    let name = path.to_string_lossy().to_lowercase();
    snapshot()
        .into_iter()
        .find(|codec| codec.extensions().iter().any(|ext| name.ends_with(ext)))
}

fn detect_from_magic<R: BufRead>(reader: &mut R) -> Option<Arc<dyn CompressionCodec>> {
    let head = reader.fill_buf().ok()?;
    if head.is_empty() {
        return None;
    }
    snapshot().into_iter().find(|codec| {
        codec
            .magic_bytes()
            .is_some_and(|magic| head.starts_with(magic))
    })
}

/// Wrap `reader` with decompression chosen by extension, then by magic bytes.
///
/// # Errors
/// Returns an error if the codec fails to initialise.
pub fn auto_detect_reader<R: Read + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn Read>> {
    if let Some(codec) = detect_from_extension(path_hint.as_ref()) {
        return codec
            .wrap_reader_dyn(Box::new(reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }

    let mut buffered = BufReader::new(reader);
    if let Some(codec) = detect_from_magic(&mut buffered) {
        return codec
            .wrap_reader_dyn(Box::new(buffered))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }
    Ok(Box::new(buffered))
}

/// Wrap `writer` with compression chosen by extension; plain files get a `BufWriter`.
/// Call [`FinishWrite::finish_dyn`] when done writing.
///
/// # Errors
/// Returns an error if the codec fails to initialise.
pub fn auto_detect_writer<W: Write + 'static>(
    writer: W,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn FinishWrite>> {
    if let Some(codec) = detect_from_extension(path_hint.as_ref()) {
        return codec
            .wrap_writer_dyn(Box::new(writer))
            .with_context(|| format!("wrap writer with {} codec", codec.name()));
    }
    Ok(Box::new(BufWriter::new(writer)))
}

/// Look up a registered codec by name.
///
/// # Errors
/// Returns an error if no codec with that name is registered.
pub fn codec_by_name(name: &str) -> Result<Arc<dyn CompressionCodec>> {
    snapshot()
        .into_iter()
        .find(|c| c.name() == name)
        .ok_or_else(|| anyhow!("no compression codec named {name}"))
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        // multi-member streams are common for appended log partitions
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn FinishWrite>> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        Ok(Box::new(GzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read>)
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn FinishWrite>> {
        zstd::stream::write::Encoder::new(writer, 3).map(|e| Box::new(e) as Box<dyn FinishWrite>)
    }
}
