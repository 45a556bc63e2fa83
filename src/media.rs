//! FFmpeg-backed video source.
//!
//! [`MediaSource`] opens a media file and implements [`VideoSource`] on top of
//! FFmpeg: a seek jumps to the nearest keyframe at or before the target and
//! decodes forward until the presented frame reaches the target timestamp.
//! Seeking is synchronous, so the returned settle signal has already fired.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg_next::{
    Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input, input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::{DynamicImage, RgbImage};

use crate::error::FrameFlowError;
use crate::metadata::VideoMetadata;
use crate::utilities::{
    duration_to_seek_timestamp, frame_to_buffer, pts_to_seconds, rational_to_fps,
};
use crate::video::{SettleSignal, VideoSource};

/// A video file opened through FFmpeg.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
///
/// use frameflow::{MediaSource, VideoSource};
///
/// let mut source = MediaSource::open("input.mp4")?;
/// let _settled = source.seek(Duration::from_secs(3))?;
/// let frame = source.capture_snapshot()?;
/// frame.save("at_3s.png")?;
/// # Ok::<(), frameflow::FrameFlowError>(())
/// ```
pub struct MediaSource {
    input_context: Input,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    video_stream_index: usize,
    time_base: Rational,
    metadata: VideoMetadata,
    presented: Option<RgbImage>,
    file_path: PathBuf,
}

impl Debug for MediaSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MediaSource")
            .field("metadata", &self.metadata)
            .field("video_stream_index", &self.video_stream_index)
            .field("file_path", &self.file_path)
            .finish_non_exhaustive()
    }
}

impl MediaSource {
    /// Open a media file and prepare its best video stream for seeking.
    ///
    /// # Errors
    ///
    /// Returns [`FrameFlowError::FileOpen`] if FFmpeg cannot open the file,
    /// or [`FrameFlowError::NoVideoStream`] if it holds no video.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FrameFlowError> {
        let path = path.as_ref();
        let file_path = path.to_path_buf();

        log::debug!("Opening media file: {}", file_path.display());

        ffmpeg_next::init().map_err(|error| FrameFlowError::FileOpen {
            path: file_path.clone(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let input_context = input(&path).map_err(|error| FrameFlowError::FileOpen {
            path: file_path.clone(),
            reason: error.to_string(),
        })?;

        let stream = input_context
            .streams()
            .best(Type::Video)
            .ok_or(FrameFlowError::NoVideoStream)?;
        let video_stream_index = stream.index();
        let time_base = stream.time_base();

        let mut frames_per_second = rational_to_fps(stream.avg_frame_rate());
        if frames_per_second <= 0.0 {
            frames_per_second = rational_to_fps(stream.rate());
        }

        let decoder_context = CodecContext::from_parameters(stream.parameters())?;
        let decoder = decoder_context.decoder().video()?;
        let (width, height) = (decoder.width(), decoder.height());

        let scaler = ScalingContext::get(
            decoder.format(),
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            ScalingFlags::BILINEAR,
        )?;

        let duration_microseconds = input_context.duration();
        let duration = if duration_microseconds > 0 {
            Duration::from_micros(duration_microseconds as u64)
        } else {
            Duration::ZERO
        };

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let size = std::fs::metadata(path).map(|meta| meta.len()).unwrap_or(0);

        let metadata = VideoMetadata {
            duration,
            width,
            height,
            frames_per_second,
            name,
            size,
        };

        log::info!(
            "Opened {} ({}x{}, {:?}, {:.2} fps)",
            metadata.name,
            width,
            height,
            duration,
            frames_per_second
        );

        Ok(Self {
            input_context,
            decoder,
            scaler,
            video_stream_index,
            time_base,
            metadata,
            presented: None,
            file_path,
        })
    }

    /// Decode forward from the current position until a frame at or past
    /// `target` seconds is presented. Falls back to the last decoded frame
    /// when the stream ends first.
    fn decode_to(&mut self, target: f64) -> Result<bool, FrameFlowError> {
        // Half a frame of tolerance so rounding in PTS does not skip the target.
        let tolerance = if self.metadata.frames_per_second > 0.0 {
            0.5 / self.metadata.frames_per_second
        } else {
            0.0
        };

        let mut decoded_frame = VideoFrame::empty();
        let mut rgb_frame = VideoFrame::empty();
        let mut presented_any = false;

        for (stream, packet) in self.input_context.packets() {
            if stream.index() != self.video_stream_index {
                continue;
            }

            self.decoder.send_packet(&packet)?;

            while self.decoder.receive_frame(&mut decoded_frame).is_ok() {
                self.scaler.run(&decoded_frame, &mut rgb_frame)?;
                self.presented = Some(rgb_image(&rgb_frame)?);
                presented_any = true;

                let pts = decoded_frame.timestamp().unwrap_or(0);
                if pts_to_seconds(pts, self.time_base) + tolerance >= target {
                    return Ok(true);
                }
            }
        }

        self.decoder.send_eof()?;
        while self.decoder.receive_frame(&mut decoded_frame).is_ok() {
            self.scaler.run(&decoded_frame, &mut rgb_frame)?;
            self.presented = Some(rgb_image(&rgb_frame)?);
            presented_any = true;
        }

        Ok(presented_any)
    }
}

fn rgb_image(rgb_frame: &VideoFrame) -> Result<RgbImage, FrameFlowError> {
    let (width, height) = (rgb_frame.width(), rgb_frame.height());
    let buffer = frame_to_buffer(rgb_frame, width, height, 3);
    RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
        FrameFlowError::FfmpegError(format!(
            "decoded frame does not fill a {width}x{height} RGB buffer"
        ))
    })
}

impl VideoSource for MediaSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn seek(&mut self, timestamp: Duration) -> Result<SettleSignal, FrameFlowError> {
        log::debug!("Seeking {} to {:?}", self.metadata.name, timestamp);

        let seek_timestamp = duration_to_seek_timestamp(timestamp);
        self.input_context.seek(seek_timestamp, ..seek_timestamp)?;
        self.decoder.flush();
        self.presented = None;

        if self.decode_to(timestamp.as_secs_f64())? {
            Ok(SettleSignal::settled())
        } else {
            // Nothing decodable: leave the signal unfired so the capture loop
            // falls through to a failed capture.
            let (_notifier, signal) = SettleSignal::channel();
            Ok(signal)
        }
    }

    fn capture_snapshot(&mut self) -> Result<DynamicImage, FrameFlowError> {
        self.presented
            .take()
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| FrameFlowError::CaptureFailed {
                timestamp: Duration::ZERO,
                reason: "no frame is presented".to_string(),
            })
    }
}
