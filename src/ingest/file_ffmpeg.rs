//! Stored video decoding using FFmpeg.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use std::time::Instant;

use super::{IngestSettings, SourceStats};
use crate::frame::{pack_rgb_rows, Frame};

pub(crate) struct FfmpegFileSource {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frame_count: u64,
    connected_at: Option<Instant>,
    eof_sent: bool,
    finished: bool,
    last_error: Option<String>,
}

impl FfmpegFileSource {
    pub(crate) fn new(path: &str, _settings: &IngestSettings) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video file '{}' with ffmpeg", path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("file '{}' has no video track", path))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            frame_count: 0,
            connected_at: None,
            eof_sent: false,
            finished: false,
            last_error: None,
        })
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        self.connected_at = Some(Instant::now());
        log::info!("FileSource: connected to {} (ffmpeg)", self.path);
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        loop {
            if let Some(frame) = self.receive_decoded()? {
                return Ok(Some(frame));
            }
            if self.eof_sent {
                self.finished = true;
                log::info!(
                    "FileSource: {} ended after {} frames",
                    self.path,
                    self.frame_count
                );
                return Ok(None);
            }

            let mut fed = false;
            for (stream, packet) in self.input.packets() {
                if stream.index() != self.stream_index {
                    continue;
                }
                if let Err(err) = self.decoder.send_packet(&packet) {
                    self.last_error = Some(err.to_string());
                    return Err(anyhow::Error::new(err).context("send packet to ffmpeg decoder"));
                }
                fed = true;
                break;
            }

            if !fed {
                if let Err(err) = self.decoder.send_eof() {
                    self.last_error = Some(err.to_string());
                    return Err(anyhow::Error::new(err).context("flush ffmpeg decoder"));
                }
                self.eof_sent = true;
            }
        }
    }

    fn receive_decoded(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;

        self.frame_count += 1;
        Frame::from_rgb(pixels, width, height, self.frame_count).map(Some)
    }

    pub(crate) fn is_healthy(&self) -> bool {
        self.last_error.is_none() && self.connected_at.is_some()
    }

    pub(crate) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            location: self.path.clone(),
        }
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let stride = frame.stride(0) as usize;
    let data = frame.data(0);

    let pixels = pack_rgb_rows(data, width, height, stride)
        .with_context(|| format!("ffmpeg frame is {}x{} with stride {}", width, height, stride))?;
    Ok((pixels, width, height))
}
