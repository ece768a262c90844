// Logical stream tracker
//
// Demultiplexes pages by serial number and welds the fragments of the active
// logical stream into packets. Only one logical stream is active at a time;
// a beginning-of-stream page with a new serial supersedes it (chaining)
// once the active stream has ended or moved past its own BOS group.
// BOS pages of other streams grouped with it are ignored.

use std::collections::VecDeque;

use tracing::debug;

use crate::ogg::page::Page;

/// One complete codec packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub data: Vec<u8>,
    /// Position of the packet within its logical stream, from 0
    pub packet_no: u64,
    /// Set on the packet that completes on an end-of-stream page last
    pub eos: bool,
    /// Granule position of the page this packet completed on, for the last
    /// packet completing there; -1 otherwise
    pub granule_position: i64,
}

/// Outcome of `packet_out`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketOut {
    Ready(Packet),
    /// Pages went missing; the packet under construction was discarded
    Hole,
    NeedMorePages,
}

/// What the tracker did with a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDisposition {
    /// Appended to the active stream
    Accepted,
    /// Started a new logical stream; carries the serial it superseded, if any
    NewStream { serial: u32, superseded: Option<u32> },
    /// Belongs to another stream and was dropped
    Ignored,
}

/// Pages that cannot be attached to a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackError {
    /// A new stream cannot start in the middle of a packet
    ContinuedFirstPage { serial: u32 },
}

impl std::fmt::Display for TrackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackError::ContinuedFirstPage { serial } => write!(
                f,
                "first page of stream {:#010x} continues a packet it never started",
                serial
            ),
        }
    }
}

impl std::error::Error for TrackError {}

#[derive(Debug)]
enum Entry {
    Packet(Packet),
    Hole,
}

/// Reassembly state of one logical stream
#[derive(Debug)]
struct LogicalStream {
    serial: u32,
    queue: VecDeque<Entry>,
    partial: Vec<u8>,
    // Set when the partial packet is known to be damaged
    skip_partial: bool,
    next_sequence: u32,
    packet_count: u64,
    pages_seen: u64,
    // Set once a non-BOS page arrives; later BOS pages start a new chain link
    bos_group_closed: bool,
    eos: bool,
}

impl LogicalStream {
    fn new(serial: u32, first_sequence: u32) -> Self {
        Self {
            serial,
            queue: VecDeque::new(),
            partial: Vec::new(),
            skip_partial: false,
            next_sequence: first_sequence,
            packet_count: 0,
            pages_seen: 0,
            bos_group_closed: false,
            eos: false,
        }
    }

    fn page_in(&mut self, page: &Page) {
        if self.pages_seen > 0 && page.sequence() != self.next_sequence {
            debug!(
                "stream {:#010x}: expected page {}, got {}",
                self.serial,
                self.next_sequence,
                page.sequence()
            );
            self.partial.clear();
            self.queue.push_back(Entry::Hole);
        } else if !page.is_continued() && !self.partial.is_empty() {
            // The previous page promised a continuation that never came
            self.partial.clear();
            self.queue.push_back(Entry::Hole);
        }
        // A leading continuation with nothing to attach to belongs to a lost packet
        self.skip_partial = page.is_continued() && self.partial.is_empty();
        self.pages_seen += 1;
        self.bos_group_closed |= !page.is_bos();
        self.next_sequence = page.sequence().wrapping_add(1);

        let fragments = page.fragments();
        let completing = fragments.iter().filter(|(_, done)| *done).count();
        let mut completed = 0;
        for (fragment, done) in fragments {
            if self.skip_partial {
                if done {
                    self.skip_partial = false;
                }
                continue;
            }
            self.partial.extend_from_slice(fragment);
            if done {
                completed += 1;
                let last = completed == completing;
                let packet = Packet {
                    data: std::mem::take(&mut self.partial),
                    packet_no: self.packet_count,
                    eos: last && page.is_eos(),
                    granule_position: if last { page.granule_position() } else { -1 },
                };
                self.packet_count += 1;
                self.queue.push_back(Entry::Packet(packet));
            }
        }

        if page.is_eos() {
            self.eos = true;
            self.partial.clear();
        }
    }
}

/// Demultiplexer following one logical stream at a time
#[derive(Debug, Default)]
pub struct StreamTracker {
    active: Option<LogicalStream>,
    streams_started: u64,
}

impl StreamTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a verified page
    pub fn page_in(&mut self, page: &Page) -> Result<PageDisposition, TrackError> {
        let starts_stream = match &self.active {
            None => true,
            // Chained stream: a fresh BOS page replaces the current stream,
            // unless it is grouped with the current stream's own BOS page
            Some(stream) => {
                stream.eos
                    || (page.serial() != stream.serial && page.is_bos() && stream.bos_group_closed)
            }
        };

        if starts_stream {
            if self.streams_started == 0 && page.is_continued() {
                return Err(TrackError::ContinuedFirstPage {
                    serial: page.serial(),
                });
            }
            let superseded = self.active.take().map(|s| s.serial);
            let mut stream = LogicalStream::new(page.serial(), page.sequence());
            stream.page_in(page);
            self.active = Some(stream);
            self.streams_started += 1;
            return Ok(PageDisposition::NewStream {
                serial: page.serial(),
                superseded,
            });
        }

        match self.active.as_mut() {
            Some(stream) if stream.serial == page.serial() && !stream.eos => {
                stream.page_in(page);
                Ok(PageDisposition::Accepted)
            }
            _ => Ok(PageDisposition::Ignored),
        }
    }

    /// Next packet of the active stream
    pub fn packet_out(&mut self) -> PacketOut {
        let Some(stream) = self.active.as_mut() else {
            return PacketOut::NeedMorePages;
        };
        match stream.queue.pop_front() {
            Some(Entry::Packet(packet)) => PacketOut::Ready(packet),
            Some(Entry::Hole) => PacketOut::Hole,
            None => PacketOut::NeedMorePages,
        }
    }

    /// Serial of the active stream
    pub fn serial(&self) -> Option<u32> {
        self.active.as_ref().map(|s| s.serial)
    }

    /// The active stream saw its end-of-stream page and has no packets left
    pub fn is_finished(&self) -> bool {
        self.active
            .as_ref()
            .map(|s| s.eos && s.queue.is_empty())
            .unwrap_or(false)
    }

    /// Number of logical streams started since creation
    pub fn streams_started(&self) -> u64 {
        self.streams_started
    }

    /// Release the active stream; the next page starts a new one
    pub fn release(&mut self) -> Option<u32> {
        self.active.take().map(|s| s.serial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::PageSpec;

    fn page(spec: PageSpec) -> Page {
        let bytes = spec.encode();
        Page::parse(&bytes).unwrap().0
    }

    fn drain(tracker: &mut StreamTracker) -> Vec<PacketOut> {
        let mut out = Vec::new();
        loop {
            match tracker.packet_out() {
                PacketOut::NeedMorePages => break,
                other => out.push(other),
            }
        }
        out
    }

    fn data(out: &PacketOut) -> &[u8] {
        match out {
            PacketOut::Ready(p) => &p.data,
            other => panic!("expected packet, got {:?}", other),
        }
    }

    #[test]
    fn test_first_page_starts_stream() {
        let mut tracker = StreamTracker::new();
        let disposition = tracker
            .page_in(&page(PageSpec::new(11, 0).bos().packet(b"head")))
            .unwrap();
        assert_eq!(
            disposition,
            PageDisposition::NewStream { serial: 11, superseded: None }
        );
        let packets = drain(&mut tracker);
        assert_eq!(packets.len(), 1);
        assert_eq!(data(&packets[0]), b"head");
    }

    #[test]
    fn test_packet_spanning_pages() {
        let mut tracker = StreamTracker::new();
        let body = vec![3u8; 600];
        tracker
            .page_in(&page(PageSpec::new(1, 0).bos().partial(&body[..510])))
            .unwrap();
        assert_eq!(tracker.packet_out(), PacketOut::NeedMorePages);
        tracker
            .page_in(&page(PageSpec::new(1, 1).continued().packet(&body[510..]).packet(b"next")))
            .unwrap();
        let packets = drain(&mut tracker);
        assert_eq!(packets.len(), 2);
        assert_eq!(data(&packets[0]), &body[..]);
        assert_eq!(data(&packets[1]), b"next");
    }

    #[test]
    fn test_packet_numbers_and_granule() {
        let mut tracker = StreamTracker::new();
        tracker
            .page_in(&page(PageSpec::new(1, 0).bos().packet(b"a").packet(b"b").granule(480)))
            .unwrap();
        match (tracker.packet_out(), tracker.packet_out()) {
            (PacketOut::Ready(a), PacketOut::Ready(b)) => {
                assert_eq!((a.packet_no, a.granule_position), (0, -1));
                assert_eq!((b.packet_no, b.granule_position), (1, 480));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_lost_page_reports_hole() {
        let mut tracker = StreamTracker::new();
        tracker
            .page_in(&page(PageSpec::new(1, 0).bos().packet(b"a").partial(&[1u8; 255])))
            .unwrap();
        // Page 1 is lost; page 2 continues a packet we never saw the start of
        tracker
            .page_in(&page(PageSpec::new(1, 2).continued().packet(b"tail").packet(b"c")))
            .unwrap();
        let packets = drain(&mut tracker);
        assert_eq!(packets.len(), 3);
        assert_eq!(data(&packets[0]), b"a");
        assert_eq!(packets[1], PacketOut::Hole);
        assert_eq!(data(&packets[2]), b"c");
    }

    #[test]
    fn test_eos_marks_finished() {
        let mut tracker = StreamTracker::new();
        tracker
            .page_in(&page(PageSpec::new(1, 0).bos().eos().packet(b"only")))
            .unwrap();
        assert!(!tracker.is_finished());
        match tracker.packet_out() {
            PacketOut::Ready(p) => assert!(p.eos),
            other => panic!("unexpected {:?}", other),
        }
        assert!(tracker.is_finished());
    }

    #[test]
    fn test_chained_stream_after_eos() {
        let mut tracker = StreamTracker::new();
        tracker
            .page_in(&page(PageSpec::new(1, 0).bos().eos().packet(b"one")))
            .unwrap();
        drain(&mut tracker);
        let disposition = tracker
            .page_in(&page(PageSpec::new(2, 0).bos().packet(b"two")))
            .unwrap();
        assert_eq!(
            disposition,
            PageDisposition::NewStream { serial: 2, superseded: Some(1) }
        );
        assert_eq!(tracker.streams_started(), 2);
        assert_eq!(data(&drain(&mut tracker)[0]), b"two");
    }

    #[test]
    fn test_foreign_page_is_ignored() {
        let mut tracker = StreamTracker::new();
        tracker
            .page_in(&page(PageSpec::new(1, 0).bos().packet(b"one")))
            .unwrap();
        let disposition = tracker
            .page_in(&page(PageSpec::new(99, 4).packet(b"other")))
            .unwrap();
        assert_eq!(disposition, PageDisposition::Ignored);
        assert_eq!(tracker.serial(), Some(1));
    }

    #[test]
    fn test_bos_supersedes_active_stream() {
        let mut tracker = StreamTracker::new();
        tracker
            .page_in(&page(PageSpec::new(1, 0).bos().packet(b"one")))
            .unwrap();
        tracker
            .page_in(&page(PageSpec::new(1, 1).packet(b"audio")))
            .unwrap();
        let disposition = tracker
            .page_in(&page(PageSpec::new(2, 0).bos().packet(b"two")))
            .unwrap();
        assert_eq!(
            disposition,
            PageDisposition::NewStream { serial: 2, superseded: Some(1) }
        );
    }

    #[test]
    fn test_grouped_bos_pages_are_ignored() {
        let mut tracker = StreamTracker::new();
        tracker
            .page_in(&page(PageSpec::new(1, 0).bos().packet(b"one")))
            .unwrap();
        let disposition = tracker
            .page_in(&page(PageSpec::new(2, 0).bos().packet(b"fishead")))
            .unwrap();
        assert_eq!(disposition, PageDisposition::Ignored);

        let disposition = tracker
            .page_in(&page(PageSpec::new(1, 1).packet(b"more")))
            .unwrap();
        assert_eq!(disposition, PageDisposition::Accepted);
        assert_eq!(tracker.serial(), Some(1));
        assert_eq!(tracker.streams_started(), 1);
        let packets = drain(&mut tracker);
        assert_eq!(packets.len(), 2);
        assert_eq!(data(&packets[1]), b"more");
    }

    #[test]
    fn test_continued_first_page_rejected() {
        let mut tracker = StreamTracker::new();
        let err = tracker
            .page_in(&page(PageSpec::new(4, 7).continued().packet(b"tail")))
            .unwrap_err();
        assert_eq!(err, TrackError::ContinuedFirstPage { serial: 4 });
    }
}
