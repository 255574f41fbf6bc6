//! Minimal RIFF/AVI 1.0 muxer with a single MJPEG video stream.

use crate::encoder::VideoWriter;
use crate::error::{RecordError, Result};
use crate::frame_source::Frame;
use byteorder::{LittleEndian, WriteBytesExt};
use image::{codecs::jpeg::JpegEncoder, ColorType};
use log::{info, warn};
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::PathBuf;

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;
const AVIH_SIZE: u32 = 56;
/// RIFF sizes and idx1 offsets are 32-bit; the finalized file must stay below this.
pub const MAX_AVI_BYTES: u64 = u32::MAX as u64;
const IDX_ENTRY_SIZE: u64 = 16;

#[derive(Debug, Clone)]
pub struct AviConfig {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Copy)]
struct IdxEntry {
    offset_from_movi: u32,
    length: u32,
}

pub struct AviWriter {
    cfg: AviConfig,
    file: Option<File>,
    // header fields patched on release
    riff_size_pos: u64,
    total_frames_pos: u64,
    stream_length_pos: u64,
    movi_size_pos: u64,
    idx: Vec<IdxEntry>,
    frames_written: u32,
    size_limit: u64,
    jpeg_buf: Vec<u8>,
}

impl AviWriter {
    pub fn create(cfg: AviConfig) -> Result<Self> {
        let mut file = File::create(&cfg.path)?;

        file.write_all(b"RIFF")?;
        let riff_size_pos = file.stream_position()?;
        file.write_u32::<LittleEndian>(0)?;
        file.write_all(b"AVI ")?;

        let suggested_buf = cfg.width.saturating_mul(cfg.height).saturating_mul(3);
        let mut hdrl: Vec<u8> = Vec::with_capacity(256);
        write_avih(&mut hdrl, cfg.width, cfg.height, cfg.fps, suggested_buf)?;
        let strh_offset = hdrl.len() as u64;
        write_strl(&mut hdrl, cfg.width, cfg.height, cfg.fps, suggested_buf)?;

        file.write_all(b"LIST")?;
        file.write_u32::<LittleEndian>(4 + hdrl.len() as u32)?;
        file.write_all(b"hdrl")?;
        let hdrl_data_start = file.stream_position()?;
        file.write_all(&hdrl)?;

        // avih: chunk header (8) + four u32 fields before dwTotalFrames
        let total_frames_pos = hdrl_data_start + 8 + 16;
        // strl: LIST header (12) + strh chunk header (8) + eight u32 fields before dwLength
        let stream_length_pos = hdrl_data_start + strh_offset + 12 + 8 + 32;

        file.write_all(b"LIST")?;
        let movi_size_pos = file.stream_position()?;
        file.write_u32::<LittleEndian>(0)?;
        file.write_all(b"movi")?;

        Ok(Self {
            cfg,
            file: Some(file),
            riff_size_pos,
            total_frames_pos,
            stream_length_pos,
            movi_size_pos,
            idx: Vec::with_capacity(4096),
            frames_written: 0,
            size_limit: MAX_AVI_BYTES,
            jpeg_buf: Vec::new(),
        })
    }

    /// Lowers the finalized-size ceiling (clamped to [`MAX_AVI_BYTES`]).
    pub fn with_size_limit(mut self, bytes: u64) -> Self {
        self.size_limit = bytes.min(MAX_AVI_BYTES);
        self
    }

    pub fn frames_written(&self) -> u32 {
        self.frames_written
    }

    /// Appends one `00dc` chunk.
    ///
    /// A chunk that would push the finalized file past the size limit is not
    /// written; the file is finalized and the writer closes instead. A failed
    /// write leaves the file truncated back to the last whole chunk.
    pub fn write_jpeg_frame(&mut self, jpeg_bytes: &[u8]) -> Result<()> {
        let movi_data_start = self.movi_size_pos + 4;
        let file = self.file.as_mut().ok_or(RecordError::EncoderClosed)?;

        let chunk_pos = file.stream_position()?;
        let padded = jpeg_bytes.len() as u64 + jpeg_bytes.len() as u64 % 2;
        let index_after = 8 + (self.idx.len() as u64 + 1) * IDX_ENTRY_SIZE;
        let finalized_len = chunk_pos + 8 + padded + index_after;
        if finalized_len > self.size_limit {
            warn!(
                "avi size limit of {} bytes reached after {} frames, closing {}",
                self.size_limit,
                self.frames_written,
                self.cfg.path.display()
            );
            if let Some(file) = self.file.take() {
                self.finalize(file)?;
            }
            return Err(RecordError::FileLimit {
                limit: self.size_limit,
            });
        }

        append_chunk(file, chunk_pos, jpeg_bytes)?;

        self.idx.push(IdxEntry {
            offset_from_movi: (chunk_pos - movi_data_start) as u32,
            length: jpeg_bytes.len() as u32,
        });
        self.frames_written = self.frames_written.saturating_add(1);
        Ok(())
    }

    fn finalize(&mut self, mut file: File) -> Result<()> {
        let file_len = file.seek(SeekFrom::End(0))?;
        let movi_size = (file_len - (self.movi_size_pos + 4)) as u32;

        file.write_all(b"idx1")?;
        file.write_u32::<LittleEndian>(self.idx.len() as u32 * 16)?;
        for e in &self.idx {
            file.write_all(b"00dc")?;
            file.write_u32::<LittleEndian>(AVIIF_KEYFRAME)?;
            file.write_u32::<LittleEndian>(e.offset_from_movi)?;
            file.write_u32::<LittleEndian>(e.length)?;
        }

        let final_len = file.seek(SeekFrom::End(0))?;
        patch_u32(&mut file, self.movi_size_pos, movi_size)?;
        patch_u32(&mut file, self.riff_size_pos, (final_len - 8) as u32)?;
        patch_u32(&mut file, self.total_frames_pos, self.frames_written)?;
        patch_u32(&mut file, self.stream_length_pos, self.frames_written)?;
        file.flush()?;
        file.sync_all()?;

        info!(
            "avi finalized: {} frames -> {}",
            self.frames_written,
            self.cfg.path.display()
        );
        Ok(())
    }
}

impl VideoWriter for AviWriter {
    fn is_opened(&self) -> bool {
        self.file.is_some()
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let expected = (self.cfg.width, self.cfg.height);
        let actual = frame.dimensions();
        if actual != expected {
            return Err(RecordError::FrameSize { expected, actual });
        }

        let mut jpeg_buf = std::mem::take(&mut self.jpeg_buf);
        jpeg_buf.clear();
        let encoded = {
            let mut enc = JpegEncoder::new_with_quality(&mut jpeg_buf, self.cfg.jpeg_quality);
            enc.encode(frame.as_raw(), actual.0, actual.1, ColorType::Rgb8.into())
                .map_err(|e| RecordError::Encode(e.to_string()))
        };
        let result = encoded.and_then(|_| self.write_jpeg_frame(&jpeg_buf));
        self.jpeg_buf = jpeg_buf;
        result
    }

    fn release(&mut self) -> Result<()> {
        match self.file.take() {
            Some(file) => self.finalize(file),
            None => Ok(()),
        }
    }
}

impl Drop for AviWriter {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            log::error!("avi finalize failed: {err}");
        }
    }
}

/// Sinks that can drop a partially written tail.
trait Truncate: Write + Seek {
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl Truncate for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Writes a `00dc` chunk at `chunk_pos`, or rolls the sink back to
/// `chunk_pos` if any part of it fails.
fn append_chunk<W: Truncate>(w: &mut W, chunk_pos: u64, payload: &[u8]) -> io::Result<()> {
    let written = (|| -> io::Result<()> {
        w.write_all(b"00dc")?;
        w.write_u32::<LittleEndian>(payload.len() as u32)?;
        w.write_all(payload)?;
        if payload.len() % 2 != 0 {
            w.write_all(&[0x00])?;
        }
        Ok(())
    })();
    if let Err(err) = written {
        w.seek(SeekFrom::Start(chunk_pos))?;
        w.truncate(chunk_pos)?;
        return Err(err);
    }
    Ok(())
}

fn patch_u32(file: &mut File, pos: u64, value: u32) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(pos))?;
    file.write_u32::<LittleEndian>(value)
}

fn write_avih<W: Write>(
    mut w: W,
    width: u32,
    height: u32,
    fps: u32,
    suggested_buf: u32,
) -> std::io::Result<()> {
    let usec_per_frame = 1_000_000u32 / fps.max(1);
    w.write_all(b"avih")?;
    w.write_u32::<LittleEndian>(AVIH_SIZE)?;
    w.write_u32::<LittleEndian>(usec_per_frame)?; // dwMicroSecPerFrame
    w.write_u32::<LittleEndian>(0)?; // dwMaxBytesPerSec
    w.write_u32::<LittleEndian>(0)?; // dwPaddingGranularity
    w.write_u32::<LittleEndian>(AVIF_HASINDEX)?; // dwFlags
    w.write_u32::<LittleEndian>(0)?; // dwTotalFrames, patched
    w.write_u32::<LittleEndian>(0)?; // dwInitialFrames
    w.write_u32::<LittleEndian>(1)?; // dwStreams
    w.write_u32::<LittleEndian>(suggested_buf)?;
    w.write_u32::<LittleEndian>(width)?;
    w.write_u32::<LittleEndian>(height)?;
    for _ in 0..4 {
        w.write_u32::<LittleEndian>(0)?; // dwReserved
    }
    Ok(())
}

fn write_strl<W: Write>(
    mut w: W,
    width: u32,
    height: u32,
    fps: u32,
    suggested_buf: u32,
) -> std::io::Result<()> {
    let mut strl: Vec<u8> = Vec::with_capacity(128);
    strl.write_all(b"strh")?;
    strl.write_u32::<LittleEndian>(56)?;
    strl.write_all(b"vids")?;
    strl.write_all(b"MJPG")?;
    strl.write_u32::<LittleEndian>(0)?; // dwFlags
    strl.write_u16::<LittleEndian>(0)?; // wPriority
    strl.write_u16::<LittleEndian>(0)?; // wLanguage
    strl.write_u32::<LittleEndian>(0)?; // dwInitialFrames
    strl.write_u32::<LittleEndian>(1)?; // dwScale
    strl.write_u32::<LittleEndian>(fps.max(1))?; // dwRate
    strl.write_u32::<LittleEndian>(0)?; // dwStart
    strl.write_u32::<LittleEndian>(0)?; // dwLength, patched
    strl.write_u32::<LittleEndian>(suggested_buf)?;
    strl.write_u32::<LittleEndian>(u32::MAX)?; // dwQuality: default
    strl.write_u32::<LittleEndian>(0)?; // dwSampleSize
    strl.write_u16::<LittleEndian>(0)?;
    strl.write_u16::<LittleEndian>(0)?;
    strl.write_u16::<LittleEndian>(width as u16)?;
    strl.write_u16::<LittleEndian>(height as u16)?;

    // BITMAPINFOHEADER
    strl.write_all(b"strf")?;
    strl.write_u32::<LittleEndian>(40)?;
    strl.write_u32::<LittleEndian>(40)?; // biSize
    strl.write_u32::<LittleEndian>(width)?;
    strl.write_u32::<LittleEndian>(height)?;
    strl.write_u16::<LittleEndian>(1)?; // biPlanes
    strl.write_u16::<LittleEndian>(24)?; // biBitCount
    strl.write_all(b"MJPG")?; // biCompression
    strl.write_u32::<LittleEndian>(width * height * 3)?; // biSizeImage
    for _ in 0..4 {
        strl.write_u32::<LittleEndian>(0)?;
    }

    w.write_all(b"LIST")?;
    w.write_u32::<LittleEndian>(4 + strl.len() as u32)?;
    w.write_all(b"strl")?;
    w.write_all(&strl)?;
    Ok(())
}
