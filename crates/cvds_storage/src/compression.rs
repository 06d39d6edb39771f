use std::io;

/// A compression algorithm that acts directly on a slice of bytes.
pub trait BytesCompression {
    fn compress_bytes(&self, bytes: &[u8]) -> io::Result<Vec<u8>>;

    /// Decompresses `compressed_bytes`, failing unless the output is exactly `expected_len` bytes.
    fn decompress_exact(&self, compressed_bytes: &[u8], expected_len: usize) -> io::Result<Vec<u8>>;
}

/// The [LZ4 block format](https://github.com/lz4/lz4/blob/dev/doc/lz4_Block_format.md), without a size prefix, as used
/// for `.cvds.lz4` chunk files.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Lz4Block {
    /// 0 uses the default fast mode. Larger values select high compression at that level (up to 12).
    pub level: i32,
}

impl Lz4Block {
    fn mode(&self) -> Option<lz4::block::CompressionMode> {
        if self.level > 0 {
            Some(lz4::block::CompressionMode::HIGHCOMPRESSION(self.level))
        } else {
            None
        }
    }
}

impl BytesCompression for Lz4Block {
    fn compress_bytes(&self, bytes: &[u8]) -> io::Result<Vec<u8>> {
        lz4::block::compress(bytes, self.mode(), false)
    }

    fn decompress_exact(&self, compressed_bytes: &[u8], expected_len: usize) -> io::Result<Vec<u8>> {
        if expected_len > i32::MAX as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} bytes exceeds the LZ4 block limit", expected_len),
            ));
        }
        let bytes = lz4::block::decompress(compressed_bytes, Some(expected_len as i32))?;
        if bytes.len() != expected_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "decompressed to {} bytes, expected {}",
                    bytes.len(),
                    expected_len
                ),
            ));
        }

        Ok(bytes)
    }
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝
