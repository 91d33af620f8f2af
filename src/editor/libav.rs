//! [`MediaEditor`] implementation on top of libav (`ffmpeg-next`).
//!
//! Each clip write opens its own demuxer, seeks to the clip start and runs a
//! decode -> encode loop for the best video and best audio stream. Frames
//! outside `[start, end)` are dropped, so cuts are frame accurate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg_next::{
    self as ffmpeg, codec, encoder, filter, format, frame, media, picture, software, Packet,
    Rational, Rescale,
};
use tracing::debug;

use crate::error::{Result, VidsplitError};

use super::{EncodeSettings, MediaClip, MediaEditor, MediaSource};

const MICROS: Rational = Rational(1, 1_000_000);
const FALLBACK_FRAME_RATE: Rational = Rational(25, 1);
const FALLBACK_AUDIO_BIT_RATE: usize = 128_000;

#[derive(Debug, Clone, Copy)]
pub struct LibavEditor;

impl LibavEditor {
    /// Initialise libav. Fails when the shared libraries cannot be set up.
    pub fn new() -> Result<Self> {
        ffmpeg::init()?;
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
        Ok(Self)
    }
}

impl MediaEditor for LibavEditor {
    type Source = LibavSource;

    fn name(&self) -> &'static str {
        "libav"
    }

    fn open(&self, path: &Path) -> Result<LibavSource> {
        let input = format::input(&path)?;
        let raw = input.duration();
        if raw <= 0 {
            return Err(VidsplitError::Encode(format!(
                "{} reports no duration",
                path.display()
            )));
        }

        // Container durations are in AV_TIME_BASE units (microseconds).
        Ok(LibavSource {
            path: path.to_path_buf(),
            duration: Duration::from_micros(raw.unsigned_abs()),
            _input: input,
        })
    }
}

pub struct LibavSource {
    path: PathBuf,
    duration: Duration,
    // Held open for the lifetime of the handle.
    _input: format::context::Input,
}

impl MediaSource for LibavSource {
    type Clip = LibavClip;

    fn duration(&self) -> Duration {
        self.duration
    }

    fn subclip(&self, start: Duration, end: Duration) -> Result<LibavClip> {
        if end <= start || start >= self.duration {
            return Err(VidsplitError::Encode(format!(
                "invalid clip range {:.3}s..{:.3}s",
                start.as_secs_f64(),
                end.as_secs_f64()
            )));
        }

        Ok(LibavClip {
            path: self.path.clone(),
            start,
            end: end.min(self.duration),
        })
    }
}

pub struct LibavClip {
    path: PathBuf,
    start: Duration,
    end: Duration,
}

impl MediaClip for LibavClip {
    fn write(&mut self, output: &Path, settings: &EncodeSettings) -> Result<()> {
        debug!(
            "libav: encoding {:.3}s..{:.3}s of {} with {}",
            self.start.as_secs_f64(),
            self.end.as_secs_f64(),
            self.path.display(),
            settings
        );
        transcode(&self.path, output, self.start, self.end, settings)
    }
}

fn micros(d: Duration) -> i64 {
    i64::try_from(d.as_micros()).unwrap_or(i64::MAX)
}

fn find_encoder(
    octx: &format::context::Output,
    output: &Path,
    name: Option<&str>,
    kind: media::Type,
) -> Result<Option<codec::Codec>> {
    match name {
        Some(name) => encoder::find_by_name(name)
            .map(Some)
            .ok_or_else(|| VidsplitError::Encode(format!("encoder '{name}' not found"))),
        None => {
            let id = octx.format().codec(&output, kind);
            if id == codec::Id::None {
                return Ok(None);
            }
            Ok(encoder::find(id))
        }
    }
}

/// Map a cut boundary onto a stream's own timestamps.
fn stream_pts(offset: Duration, stream: &format::stream::Stream) -> i64 {
    let origin = match stream.start_time() {
        ffmpeg::ffi::AV_NOPTS_VALUE => 0,
        t => t,
    };
    origin + micros(offset).rescale(MICROS, stream.time_base())
}

struct Window {
    start_pts: i64,
    end_pts: i64,
}

impl Window {
    fn new(start: Duration, end: Duration, stream: &format::stream::Stream) -> Self {
        Self {
            start_pts: stream_pts(start, stream),
            end_pts: stream_pts(end, stream),
        }
    }
}

struct VideoTranscoder {
    input_index: usize,
    output_index: usize,
    in_time_base: Rational,
    enc_time_base: Rational,
    out_time_base: Rational,
    window: Window,
    decoder: ffmpeg::decoder::Video,
    encoder: encoder::video::Encoder,
    scaler: Option<software::scaling::Context>,
    done: bool,
}

impl VideoTranscoder {
    fn new(
        stream: &format::stream::Stream,
        octx: &mut format::context::Output,
        output: &Path,
        codec_name: Option<&str>,
        window: Window,
    ) -> Result<Option<Self>> {
        let Some(codec) = find_encoder(octx, output, codec_name, media::Type::Video)? else {
            return Ok(None);
        };
        let global_header = octx.format().flags().contains(format::flag::Flags::GLOBAL_HEADER);

        let decoder = codec::context::Context::from_parameters(stream.parameters())?
            .decoder()
            .video()?;

        let pixel_format = codec
            .video()
            .ok()
            .and_then(|v| v.formats())
            .and_then(|formats| {
                let supported: Vec<format::Pixel> = formats.collect();
                if supported.contains(&decoder.format()) {
                    Some(decoder.format())
                } else {
                    supported.first().copied()
                }
            })
            .unwrap_or(decoder.format());

        let frame_rate = decoder
            .frame_rate()
            .filter(|r| r.numerator() > 0)
            .unwrap_or_else(|| {
                let avg = stream.avg_frame_rate();
                if avg.numerator() > 0 {
                    avg
                } else {
                    FALLBACK_FRAME_RATE
                }
            });
        let enc_time_base = frame_rate.invert();

        let mut ost = octx.add_stream(codec)?;
        let output_index = ost.index();

        let mut setup = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        setup.set_width(decoder.width());
        setup.set_height(decoder.height());
        setup.set_aspect_ratio(decoder.aspect_ratio());
        setup.set_format(pixel_format);
        setup.set_frame_rate(Some(frame_rate));
        setup.set_time_base(enc_time_base);
        if global_header {
            setup.set_flags(codec::flag::Flags::GLOBAL_HEADER);
        }

        let encoder = setup.open_as(codec)?;
        ost.set_parameters(&encoder);
        ost.set_time_base(enc_time_base);

        let scaler = if pixel_format != decoder.format() {
            Some(software::scaling::Context::get(
                decoder.format(),
                decoder.width(),
                decoder.height(),
                pixel_format,
                decoder.width(),
                decoder.height(),
                software::scaling::Flags::BILINEAR,
            )?)
        } else {
            None
        };

        Ok(Some(Self {
            input_index: stream.index(),
            output_index,
            in_time_base: stream.time_base(),
            enc_time_base,
            out_time_base: enc_time_base,
            window,
            decoder,
            encoder,
            scaler,
            done: false,
        }))
    }

    fn send_packet(&mut self, packet: &Packet, octx: &mut format::context::Output) -> Result<()> {
        self.decoder.send_packet(packet)?;
        self.receive_frames(octx)
    }

    fn receive_frames(&mut self, octx: &mut format::context::Output) -> Result<()> {
        let mut decoded = frame::Video::empty();
        while !self.done && self.decoder.receive_frame(&mut decoded).is_ok() {
            let Some(pts) = decoded.timestamp().or(decoded.pts()) else {
                continue;
            };
            if pts < self.window.start_pts {
                continue;
            }
            if pts >= self.window.end_pts {
                self.done = true;
                break;
            }

            let mut out = match self.scaler.as_mut() {
                Some(scaler) => {
                    let mut scaled = frame::Video::empty();
                    scaler.run(&decoded, &mut scaled)?;
                    scaled
                }
                None => decoded.clone(),
            };
            let relative = pts - self.window.start_pts;
            out.set_pts(Some(relative.rescale(self.in_time_base, self.enc_time_base)));
            out.set_kind(picture::Type::None);

            self.encoder.send_frame(&out)?;
            self.receive_packets(octx)?;
        }
        Ok(())
    }

    fn receive_packets(&mut self, octx: &mut format::context::Output) -> Result<()> {
        let mut encoded = Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(self.output_index);
            encoded.rescale_ts(self.enc_time_base, self.out_time_base);
            encoded.write_interleaved(octx)?;
        }
        Ok(())
    }

    fn finish(&mut self, octx: &mut format::context::Output) -> Result<()> {
        self.decoder.send_eof()?;
        self.receive_frames(octx)?;
        self.encoder.send_eof()?;
        self.receive_packets(octx)
    }
}

struct AudioTranscoder {
    input_index: usize,
    output_index: usize,
    enc_time_base: Rational,
    out_time_base: Rational,
    window: Window,
    decoder: ffmpeg::decoder::Audio,
    encoder: encoder::audio::Encoder,
    graph: filter::Graph,
    next_pts: i64,
    done: bool,
}

impl AudioTranscoder {
    fn new(
        stream: &format::stream::Stream,
        octx: &mut format::context::Output,
        output: &Path,
        codec_name: Option<&str>,
        window: Window,
    ) -> Result<Option<Self>> {
        let Some(codec) = find_encoder(octx, output, codec_name, media::Type::Audio)? else {
            return Ok(None);
        };
        let audio_codec = codec.audio()?;
        let global_header = octx.format().flags().contains(format::flag::Flags::GLOBAL_HEADER);

        let decoder = codec::context::Context::from_parameters(stream.parameters())?
            .decoder()
            .audio()?;
        let in_layout = if decoder.channel_layout().is_empty() {
            ffmpeg::ChannelLayout::default(i32::from(decoder.channels()))
        } else {
            decoder.channel_layout()
        };

        let channel_layout = audio_codec
            .channel_layouts()
            .map(|layouts| layouts.best(in_layout.channels()))
            .unwrap_or(ffmpeg::ChannelLayout::STEREO);
        let sample_format = audio_codec
            .formats()
            .and_then(|mut formats| formats.next())
            .unwrap_or(decoder.format());
        let rate = i32::try_from(decoder.rate()).unwrap_or(48_000);
        let enc_time_base = Rational(1, rate);

        let mut ost = octx.add_stream(codec)?;
        let output_index = ost.index();

        let mut setup = codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()?;
        setup.set_rate(rate);
        setup.set_channel_layout(channel_layout);
        setup.set_channels(channel_layout.channels());
        setup.set_format(sample_format);
        setup.set_bit_rate(if decoder.bit_rate() > 0 {
            decoder.bit_rate()
        } else {
            FALLBACK_AUDIO_BIT_RATE
        });
        setup.set_time_base(enc_time_base);
        if global_header {
            setup.set_flags(codec::flag::Flags::GLOBAL_HEADER);
        }

        let encoder = setup.open_as(codec)?;
        ost.set_parameters(&encoder);
        ost.set_time_base(enc_time_base);

        let graph = audio_graph(stream.time_base(), &decoder, in_layout, &encoder)?;

        Ok(Some(Self {
            input_index: stream.index(),
            output_index,
            enc_time_base,
            out_time_base: enc_time_base,
            window,
            decoder,
            encoder,
            graph,
            next_pts: 0,
            done: false,
        }))
    }

    fn send_packet(&mut self, packet: &Packet, octx: &mut format::context::Output) -> Result<()> {
        self.decoder.send_packet(packet)?;
        self.receive_frames(octx)
    }

    fn receive_frames(&mut self, octx: &mut format::context::Output) -> Result<()> {
        let mut decoded = frame::Audio::empty();
        while !self.done && self.decoder.receive_frame(&mut decoded).is_ok() {
            let Some(pts) = decoded.timestamp().or(decoded.pts()) else {
                continue;
            };
            if pts < self.window.start_pts {
                continue;
            }
            if pts >= self.window.end_pts {
                self.done = true;
                break;
            }

            decoded.set_pts(Some(pts - self.window.start_pts));
            match self.graph.get("in") {
                Some(mut input) => input.source().add(&decoded)?,
                None => return Err(filter_missing("in")),
            }
            self.receive_filtered(octx)?;
        }
        Ok(())
    }

    fn receive_filtered(&mut self, octx: &mut format::context::Output) -> Result<()> {
        let mut filtered = frame::Audio::empty();
        loop {
            let mut sink = self.graph.get("out").ok_or_else(|| filter_missing("out"))?;
            if sink.sink().frame(&mut filtered).is_err() {
                break;
            }

            // Timestamps are sample counts in the encoder's 1/rate time base.
            filtered.set_pts(Some(self.next_pts));
            self.next_pts += i64::try_from(filtered.samples()).unwrap_or(0);

            self.encoder.send_frame(&filtered)?;
            self.receive_packets(octx)?;
        }
        Ok(())
    }

    fn receive_packets(&mut self, octx: &mut format::context::Output) -> Result<()> {
        let mut encoded = Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(self.output_index);
            encoded.rescale_ts(self.enc_time_base, self.out_time_base);
            encoded.write_interleaved(octx)?;
        }
        Ok(())
    }

    fn finish(&mut self, octx: &mut format::context::Output) -> Result<()> {
        self.decoder.send_eof()?;
        self.receive_frames(octx)?;
        match self.graph.get("in") {
            Some(mut input) => input.source().flush()?,
            None => return Err(filter_missing("in")),
        }
        self.receive_filtered(octx)?;
        self.encoder.send_eof()?;
        self.receive_packets(octx)
    }
}

fn filter_missing(name: &str) -> VidsplitError {
    VidsplitError::Encode(format!("libav filter '{name}' missing"))
}

fn audio_graph(
    in_time_base: Rational,
    decoder: &ffmpeg::decoder::Audio,
    in_layout: ffmpeg::ChannelLayout,
    encoder: &encoder::audio::Encoder,
) -> Result<filter::Graph> {
    let mut graph = filter::Graph::new();
    let args = format!(
        "time_base={}:sample_rate={}:sample_fmt={}:channel_layout=0x{:x}",
        in_time_base,
        decoder.rate(),
        decoder.format().name(),
        in_layout.bits()
    );
    graph.add(&filter::find("abuffer").ok_or_else(|| filter_missing("abuffer"))?, "in", &args)?;
    graph.add(
        &filter::find("abuffersink").ok_or_else(|| filter_missing("abuffersink"))?,
        "out",
        "",
    )?;

    {
        let mut out = graph.get("out").ok_or_else(|| filter_missing("out"))?;
        out.set_sample_format(encoder.format());
        out.set_channel_layout(encoder.channel_layout());
        out.set_sample_rate(encoder.rate());
    }

    graph.output("in", 0)?.input("out", 0)?.parse("anull")?;
    graph.validate()?;

    let fixed_frame_size = encoder.codec().is_some_and(|c| {
        !c.capabilities()
            .contains(codec::capabilities::Capabilities::VARIABLE_FRAME_SIZE)
    });
    if fixed_frame_size {
        if let Some(mut out) = graph.get("out") {
            out.sink().set_frame_size(encoder.frame_size());
        }
    }

    Ok(graph)
}

/// Re-encode `[start, end)` of `input` into `output`.
fn transcode(
    input: &Path,
    output: &Path,
    start: Duration,
    end: Duration,
    settings: &EncodeSettings,
) -> Result<()> {
    let mut ictx = format::input(&input)?;
    let mut octx = format::output(&output)?;

    let mut video = None;
    if let Some(stream) = ictx.streams().best(media::Type::Video) {
        let window = Window::new(start, end, &stream);
        video = VideoTranscoder::new(
            &stream,
            &mut octx,
            output,
            settings.video_codec.as_deref(),
            window,
        )?;
    }

    let mut audio = None;
    if let Some(stream) = ictx.streams().best(media::Type::Audio) {
        let window = Window::new(start, end, &stream);
        audio = AudioTranscoder::new(
            &stream,
            &mut octx,
            output,
            settings.audio_codec.as_deref(),
            window,
        )?;
    }

    if video.is_none() && audio.is_none() {
        return Err(VidsplitError::Encode(format!(
            "{} has no encodable audio or video stream",
            input.display()
        )));
    }

    octx.set_metadata(ictx.metadata().to_owned());
    octx.write_header()?;

    // The muxer may adjust stream time bases while writing the header.
    if let Some(v) = video.as_mut() {
        if let Some(stream) = octx.stream(v.output_index) {
            v.out_time_base = stream.time_base();
        }
    }
    if let Some(a) = audio.as_mut() {
        if let Some(stream) = octx.stream(a.output_index) {
            a.out_time_base = stream.time_base();
        }
    }

    let seek_to = micros(start);
    ictx.seek(seek_to, ..seek_to)?;

    for (stream, packet) in ictx.packets() {
        let index = stream.index();
        match (video.as_mut(), audio.as_mut()) {
            (Some(v), _) if v.input_index == index && !v.done => v.send_packet(&packet, &mut octx)?,
            (_, Some(a)) if a.input_index == index && !a.done => a.send_packet(&packet, &mut octx)?,
            _ => {}
        }

        let video_done = video.as_ref().map_or(true, |v| v.done);
        let audio_done = audio.as_ref().map_or(true, |a| a.done);
        if video_done && audio_done {
            break;
        }
    }

    if let Some(v) = video.as_mut() {
        v.finish(&mut octx)?;
    }
    if let Some(a) = audio.as_mut() {
        a.finish(&mut octx)?;
    }

    octx.write_trailer()?;
    Ok(())
}
