// Decode pipeline
//
// One synchronous loop: read -> page sync -> stream tracking -> header
// negotiation or decoding -> sink. It goes back to the source whenever the
// buffered bytes yield no further page.
//
// Failure placement:
// - anything wrong with the first logical stream's headers ends the run
// - a chained stream with bad headers is abandoned until the next BOS page
// - a decode error ends the run or the stream, per `DecodeErrorPolicy`

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::codec::{Codec, StreamInfo};
use crate::config::{ConfigError, DecodeErrorPolicy, PipelineConfig};
use crate::driver::{DecodeDriver, DriverStats};
use crate::error::{DecodeError, ErrorCode, Result};
use crate::feed::{DecodeFeed, Flow};
use crate::negotiate::{HeaderNegotiator, Negotiation};
use crate::ogg::{Packet, PacketOut, Page, PageDisposition, PageSynchronizer, StreamTracker, SyncResult};

/// How a logical stream ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StreamOutcome {
    /// End-of-stream page reached
    Completed,
    /// The source ran dry without an end-of-stream page
    Truncated,
    /// A new logical stream started before this one ended
    Superseded,
    Cancelled,
    Failed { code: ErrorCode, message: String },
}

impl StreamOutcome {
    fn failed(err: &DecodeError) -> Self {
        StreamOutcome::Failed {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Summary of one logical stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamReport {
    pub serial: u32,
    /// Present once the headers were negotiated
    pub info: Option<StreamInfo>,
    pub packets_decoded: u64,
    pub frames_written: u64,
    pub samples_written: u64,
    pub clipped_packets: u64,
    pub holes: u64,
    pub outcome: StreamOutcome,
}

impl StreamReport {
    pub fn seconds_written(&self) -> f64 {
        match &self.info {
            Some(info) if info.sample_rate() > 0 => {
                self.frames_written as f64 / info.sample_rate() as f64
            }
            _ => 0.0,
        }
    }
}

/// Summary of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecodeReport {
    pub streams: Vec<StreamReport>,
    pub bytes_read: u64,
    pub bytes_skipped: u64,
    pub pages: u64,
    pub cancelled: bool,
}

impl DecodeReport {
    /// Last stream failure, or success
    pub fn code(&self) -> ErrorCode {
        self.streams
            .iter()
            .rev()
            .find_map(|s| match &s.outcome {
                StreamOutcome::Failed { code, .. } => Some(*code),
                _ => None,
            })
            .unwrap_or(ErrorCode::Success)
    }

    /// Playback time delivered to the sink
    pub fn seconds_written(&self) -> f64 {
        self.streams.iter().map(StreamReport::seconds_written).sum()
    }

    pub fn frames_written(&self) -> u64 {
        self.streams.iter().map(|s| s.frames_written).sum()
    }
}

/// The decode loop with its codec strategy
pub struct Pipeline {
    config: PipelineConfig,
    codec: Box<dyn Codec>,
    last_report: DecodeReport,
}

impl Pipeline {
    /// Pipeline for the codec named in `config`
    pub fn new(config: PipelineConfig) -> std::result::Result<Self, ConfigError> {
        let codec = config.codec.strategy(&config);
        Self::with_codec(config, codec)
    }

    /// Pipeline with a caller-supplied codec strategy
    pub fn with_codec(
        config: PipelineConfig,
        codec: Box<dyn Codec>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Pipeline {
            config,
            codec,
            last_report: DecodeReport::default(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Report of the most recent run, including failed ones
    pub fn last_report(&self) -> &DecodeReport {
        &self.last_report
    }

    /// Decode everything `feed` supplies
    pub fn run<F: DecodeFeed + ?Sized>(&mut self, feed: &mut F) -> Result<DecodeReport> {
        let (result, report) = {
            let mut run = Run::new(&self.config, self.codec.as_mut());
            let result = run.execute(feed);
            (result, run.report)
        };
        self.last_report = report.clone();
        result.map(|()| report)
    }

    /// `run` reduced to its integer result code
    pub fn read_decode_write_loop<F: DecodeFeed + ?Sized>(&mut self, feed: &mut F) -> i32 {
        match self.run(feed) {
            Ok(_) => ErrorCode::Success.as_i32(),
            Err(err) => err.code().as_i32(),
        }
    }
}

enum Phase {
    Negotiating(HeaderNegotiator),
    Decoding { info: StreamInfo, driver: DecodeDriver },
    /// Packets are dropped until the stream ends or is superseded
    Abandoned,
}

struct ActiveStream {
    serial: u32,
    // 0 for the first logical stream of the run
    index: u64,
    phase: Phase,
    holes: u64,
    reported: bool,
}

struct Run<'p> {
    config: &'p PipelineConfig,
    codec: &'p mut dyn Codec,
    sync: PageSynchronizer,
    tracker: StreamTracker,
    active: Option<ActiveStream>,
    ready_streams: usize,
    report: DecodeReport,
}

impl<'p> Run<'p> {
    fn new(config: &'p PipelineConfig, codec: &'p mut dyn Codec) -> Self {
        Run {
            config,
            codec,
            sync: PageSynchronizer::new(),
            tracker: StreamTracker::new(),
            active: None,
            ready_streams: 0,
            report: DecodeReport::default(),
        }
    }

    fn execute<F: DecodeFeed + ?Sized>(&mut self, feed: &mut F) -> Result<()> {
        feed.on_begin_header_negotiation();
        let result = self.pump(feed);

        let outcome = match &result {
            Ok(()) if self.report.cancelled => StreamOutcome::Cancelled,
            Ok(()) => StreamOutcome::Truncated,
            Err(err) => StreamOutcome::failed(err),
        };
        self.finish_stream(feed, outcome);
        self.active = None;
        if self.ready_streams == 0 {
            feed.on_stream_end();
        }
        self.report.bytes_skipped = self.sync.total_skipped();

        match &result {
            Ok(()) => info!(
                "decode finished: {} stream(s), {:.2}s of audio",
                self.report.streams.len(),
                self.report.seconds_written()
            ),
            Err(err) => error!("decode failed: {}", err),
        }
        result
    }

    fn pump<F: DecodeFeed + ?Sized>(&mut self, feed: &mut F) -> Result<()> {
        let mut buf = vec![0u8; self.config.read_chunk_size];
        loop {
            if self.drain_pages(feed)? == Flow::Stop {
                debug!("stopped by consumer");
                self.report.cancelled = true;
                return Ok(());
            }
            let n = feed.read(&mut buf).min(buf.len());
            if n == 0 {
                return self.end_of_source(feed);
            }
            self.report.bytes_read += n as u64;
            self.sync.submit(&buf[..n]);
        }
    }

    fn end_of_source<F: DecodeFeed + ?Sized>(&mut self, feed: &mut F) -> Result<()> {
        if self.sync.buffered() > 0 {
            debug!("{} trailing bytes never formed a page", self.sync.buffered());
        }
        if self.report.pages == 0 {
            if self.sync.total_submitted() == 0 {
                debug!("source was empty");
                return Ok(());
            }
            return Err(DecodeError::InvalidBitstream(format!(
                "no Ogg page in {} bytes of input",
                self.sync.total_submitted()
            )));
        }
        let premature = match self.active.as_ref().map(|s| &s.phase) {
            Some(Phase::Negotiating(negotiator)) => Some(negotiator.premature_end()),
            _ => None,
        };
        match premature {
            Some(err) => self.fail_stream(feed, err),
            None => Ok(()),
        }
    }

    fn drain_pages<F: DecodeFeed + ?Sized>(&mut self, feed: &mut F) -> Result<Flow> {
        loop {
            match self.sync.next_page() {
                SyncResult::NeedMoreData => return Ok(Flow::Continue),
                SyncResult::Corrupt { skipped } => {
                    if self.report.pages == 0 {
                        if self.sync.total_skipped() > self.config.max_sync_search as u64 {
                            return Err(DecodeError::InvalidBitstream(format!(
                                "no Ogg page within the first {} bytes",
                                self.config.max_sync_search
                            )));
                        }
                    } else {
                        warn!("corrupt or missing data in bitstream ({} bytes skipped)", skipped);
                    }
                }
                SyncResult::Ready(page) => {
                    self.report.pages += 1;
                    if self.handle_page(feed, &page)? == Flow::Stop {
                        return Ok(Flow::Stop);
                    }
                }
            }
        }
    }

    fn handle_page<F: DecodeFeed + ?Sized>(&mut self, feed: &mut F, page: &Page) -> Result<Flow> {
        if self.config.debug {
            debug!(
                "page {} of stream {:#010x}: {} body bytes, granule {}{}{}{}",
                page.sequence(),
                page.serial(),
                page.body.len(),
                page.granule_position(),
                if page.is_bos() { " bos" } else { "" },
                if page.is_eos() { " eos" } else { "" },
                if page.is_continued() { " continued" } else { "" },
            );
        }

        let disposition = self
            .tracker
            .page_in(page)
            .map_err(|e| DecodeError::FirstPage(e.to_string()))?;
        let first_page = match disposition {
            PageDisposition::Ignored => {
                if self.config.debug {
                    debug!("ignoring page of foreign stream {:#010x}", page.serial());
                }
                return Ok(Flow::Continue);
            }
            PageDisposition::NewStream { serial, superseded } => {
                self.start_stream(feed, serial, superseded);
                true
            }
            PageDisposition::Accepted => false,
        };

        if self.drain_packets(feed)? == Flow::Stop {
            return Ok(Flow::Stop);
        }

        if first_page {
            let no_header = matches!(
                self.active.as_ref().map(|s| &s.phase),
                Some(Phase::Negotiating(negotiator)) if negotiator.received() == 0
            );
            if no_header {
                self.fail_stream(feed, DecodeError::InitialHeaderPacket)?;
            }
        }

        if self.tracker.is_finished() {
            self.end_stream(feed)?;
        }
        Ok(Flow::Continue)
    }

    fn drain_packets<F: DecodeFeed + ?Sized>(&mut self, feed: &mut F) -> Result<Flow> {
        loop {
            if feed.on_iteration_begin() == Flow::Stop {
                return Ok(Flow::Stop);
            }
            match self.tracker.packet_out() {
                PacketOut::NeedMorePages => return Ok(Flow::Continue),
                PacketOut::Hole => self.handle_hole(feed)?,
                PacketOut::Ready(packet) => self.handle_packet(feed, packet)?,
            }
        }
    }

    fn start_stream<F: DecodeFeed + ?Sized>(
        &mut self,
        feed: &mut F,
        serial: u32,
        superseded: Option<u32>,
    ) {
        if let Some(previous) = superseded {
            info!("stream {:#010x} superseded by {:#010x}", previous, serial);
            self.finish_stream(feed, StreamOutcome::Superseded);
        }
        self.codec.reset();
        let negotiator = HeaderNegotiator::new(serial, &*self.codec);
        debug!(
            "stream {:#010x}: awaiting {} {} header packets",
            serial,
            negotiator.expected(),
            self.codec.kind()
        );
        self.active = Some(ActiveStream {
            serial,
            index: self.tracker.streams_started().saturating_sub(1),
            phase: Phase::Negotiating(negotiator),
            holes: 0,
            reported: false,
        });
    }

    fn handle_hole<F: DecodeFeed + ?Sized>(&mut self, feed: &mut F) -> Result<()> {
        let Some(stream) = self.active.as_mut() else {
            return Ok(());
        };
        stream.holes += 1;
        match &mut stream.phase {
            Phase::Negotiating(negotiator) => {
                let err = negotiator.hole();
                self.fail_stream(feed, err)
            }
            Phase::Decoding { .. } => {
                warn!("stream {:#010x}: pages lost, damaged packet skipped", stream.serial);
                Ok(())
            }
            Phase::Abandoned => Ok(()),
        }
    }

    fn handle_packet<F: DecodeFeed + ?Sized>(&mut self, feed: &mut F, packet: Packet) -> Result<()> {
        let Some(stream) = self.active.as_mut() else {
            return Ok(());
        };
        if self.config.debug {
            debug!(
                "stream {:#010x}: packet {} ({} bytes, granule {}{})",
                stream.serial,
                packet.packet_no,
                packet.data.len(),
                packet.granule_position,
                if packet.eos { ", eos" } else { "" }
            );
        }

        match &mut stream.phase {
            Phase::Abandoned => Ok(()),
            Phase::Negotiating(negotiator) => {
                match negotiator.push_packet(&mut *self.codec, &packet.data) {
                    Ok(Negotiation::NeedMore) => Ok(()),
                    Ok(Negotiation::Ready) => self.stream_ready(feed),
                    Err(err) => self.fail_stream(feed, err),
                }
            }
            Phase::Decoding { driver, .. } => {
                if packet.data.is_empty() {
                    return Ok(());
                }
                match driver.decode(&packet.data, feed) {
                    Ok(_) => Ok(()),
                    Err(err) => self.fail_stream(feed, err),
                }
            }
        }
    }

    fn stream_ready<F: DecodeFeed + ?Sized>(&mut self, feed: &mut F) -> Result<()> {
        let Some(stream) = self.active.as_mut() else {
            return Ok(());
        };
        let Phase::Negotiating(negotiator) = std::mem::replace(&mut stream.phase, Phase::Abandoned)
        else {
            return Ok(());
        };
        let info = negotiator.into_info();
        let handle = match self.codec.create_decoder(&info) {
            Ok(handle) => handle,
            Err(err) => return self.fail_stream(feed, err),
        };

        info!(
            "stream {:#010x}: {} {} Hz, {} channel(s), vendor \"{}\"",
            info.serial,
            info.codec,
            info.sample_rate(),
            info.channels(),
            info.metadata.vendor
        );
        let driver = DecodeDriver::new(handle, info.channels(), self.config.max_write_samples);
        stream.phase = Phase::Decoding {
            info: info.clone(),
            driver,
        };
        self.ready_streams += 1;
        feed.begin_stream(&info);
        feed.on_stream_ready(&info);
        Ok(())
    }

    /// End-of-stream page reached and all of its packets consumed
    fn end_stream<F: DecodeFeed + ?Sized>(&mut self, feed: &mut F) -> Result<()> {
        let premature = match self.active.as_ref().map(|s| &s.phase) {
            Some(Phase::Negotiating(negotiator)) => Some(negotiator.premature_end()),
            _ => None,
        };
        let result = match premature {
            Some(err) => self.fail_stream(feed, err),
            None => {
                self.finish_stream(feed, StreamOutcome::Completed);
                Ok(())
            }
        };
        self.tracker.release();
        self.active = None;
        result
    }

    /// Record the failure and abandon the stream; Err if the run must end
    fn fail_stream<F: DecodeFeed + ?Sized>(&mut self, feed: &mut F, err: DecodeError) -> Result<()> {
        let Some(stream) = self.active.as_ref() else {
            return Err(err);
        };
        let fatal = if err.is_header_error() {
            stream.index == 0
        } else {
            self.config.decode_error_policy == DecodeErrorPolicy::Terminate
        };
        if fatal {
            error!("stream {:#010x}: {}", stream.serial, err);
        } else {
            warn!("stream {:#010x} abandoned: {}", stream.serial, err);
        }
        self.finish_stream(feed, StreamOutcome::failed(&err));
        if fatal {
            Err(err)
        } else {
            Ok(())
        }
    }

    /// Release the stream's decoder and record its report, once
    fn finish_stream<F: DecodeFeed + ?Sized>(&mut self, feed: &mut F, outcome: StreamOutcome) {
        let Some(stream) = self.active.as_mut() else {
            return;
        };
        if stream.reported {
            return;
        }
        stream.reported = true;

        let (info, stats) = match std::mem::replace(&mut stream.phase, Phase::Abandoned) {
            Phase::Decoding { info, driver } => (Some(info), driver.stats()),
            _ => (None, DriverStats::default()),
        };
        self.codec.reset();
        let record = StreamReport {
            serial: stream.serial,
            info,
            packets_decoded: stats.packets,
            frames_written: stats.frames,
            samples_written: stats.samples,
            clipped_packets: stats.clipped_packets,
            holes: stream.holes,
            outcome,
        };
        if stats.clipped_packets > 0 {
            warn!(
                "stream {:#010x}: {} packet(s) clipped",
                record.serial, stats.clipped_packets
            );
        }

        let was_ready = record.info.is_some();
        if was_ready {
            info!(
                "stream {:#010x} ended ({:?}): {} frames",
                record.serial, record.outcome, record.frames_written
            );
        }
        self.report.streams.push(record);
        if was_ready {
            feed.on_stream_end();
        }
    }
}
