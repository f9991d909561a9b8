//! Packet sources for the binary IEX-TP feeds.
//!
//! IEX distributes historical TOPS/DEEP data (the HIST endpoint) as pcap
//! dumps of the multicast feed, optionally gzipped and in either classic
//! pcap or pcap-ng format; the live feed arrives as UDP datagrams. A
//! [`PacketSource`] abstracts over all of these, yielding one IEX-TP
//! segment payload (the UDP application payload) at a time, and
//! [`PcapScanner`] turns a source into a lazy stream of decoded messages.

use std::collections::VecDeque;
use std::io::{Cursor, Read};
use std::net::UdpSocket;

use chrono::{DateTime, Utc};
use etherparse::{SlicedPacket, TransportSlice};
use flate2::read::GzDecoder;
use tracing::{trace, warn};

use crate::error::{IexError, IexResult};
use crate::iextp::{Message, Registry, Segment};

const MAGIC_GZIP: [u8; 2] = [0x1f, 0x8b];
const MAGIC_PCAPNG: u32 = 0x0A0D0D0A;
const MAGIC_PCAP_LE_MICROS: [u8; 4] = [0xd4, 0xc3, 0xb2, 0xa1];
const MAGIC_PCAP_BE_MICROS: [u8; 4] = [0xa1, 0xb2, 0xc3, 0xd4];
const MAGIC_PCAP_LE_NANOS: [u8; 4] = [0x4d, 0x3c, 0xb2, 0xa1];
const MAGIC_PCAP_BE_NANOS: [u8; 4] = [0xa1, 0xb2, 0x3c, 0x4d];

const LINKTYPE_ETHERNET: u16 = 1;

// pcap-ng block types.
const BLOCK_SECTION_HEADER: u32 = 0x0A0D0D0A;
const BLOCK_INTERFACE_DESCRIPTION: u32 = 0x00000001;
const BLOCK_PACKET: u32 = 0x00000002;
const BLOCK_SIMPLE_PACKET: u32 = 0x00000003;
const BLOCK_ENHANCED_PACKET: u32 = 0x00000006;

const OPTION_IF_TSRESOL: u16 = 9;

// Upper bound on a single pcap-ng block; anything larger is corrupt input.
const MAX_BLOCK_LEN: usize = 16 * 1024 * 1024;

/// Yields IEX-TP segment payloads, one per transport packet.
///
/// `next_payload` returns `Ok(None)` at a clean end of input.
pub trait PacketSource {
    fn next_payload(&mut self) -> IexResult<Option<Vec<u8>>>;
}

/// One captured frame, before link-layer extraction.
struct CapturedPacket {
    timestamp: DateTime<Utc>,
    link_type: u16,
    data: Vec<u8>,
}

/// A [`PacketSource`] over a packet capture byte stream.
///
/// Looks at the leading magic to auto-detect gzip compression, then
/// pcap-ng vs classic pcap (either byte order, microsecond or nanosecond
/// resolution), and extracts the UDP application payload from each
/// captured Ethernet frame. Non-UDP packets are skipped.
pub struct CaptureSource {
    reader: CaptureReader,
}

enum CaptureReader {
    Pcap(PcapReader),
    PcapNg(PcapNgReader),
}

impl CaptureSource {
    pub fn new<R: Read + Send + 'static>(reader: R) -> IexResult<CaptureSource> {
        let mut reader: Box<dyn Read + Send> = Box::new(reader);

        let mut gzip_magic = [0u8; 2];
        read_full(&mut reader, &mut gzip_magic)?;
        if gzip_magic == MAGIC_GZIP {
            // Hand the magic back to the decoder and decompress in stream.
            let chained = Cursor::new(gzip_magic.to_vec()).chain(reader);
            reader = Box::new(GzDecoder::new(chained));
        } else {
            reader = Box::new(Cursor::new(gzip_magic.to_vec()).chain(reader));
        }

        let mut magic = [0u8; 4];
        read_full(&mut reader, &mut magic)?;

        let reader = if u32::from_le_bytes(magic) == MAGIC_PCAPNG {
            CaptureReader::PcapNg(PcapNgReader::new(reader)?)
        } else {
            match magic {
                MAGIC_PCAP_LE_MICROS | MAGIC_PCAP_LE_NANOS => {
                    CaptureReader::Pcap(PcapReader::new(reader, false, magic == MAGIC_PCAP_LE_NANOS)?)
                }
                MAGIC_PCAP_BE_MICROS | MAGIC_PCAP_BE_NANOS => {
                    CaptureReader::Pcap(PcapReader::new(reader, true, magic == MAGIC_PCAP_BE_NANOS)?)
                }
                _ => {
                    return Err(IexError::Pcap(format!(
                        "unrecognized capture magic {:02x?}",
                        magic
                    )))
                }
            }
        };

        Ok(CaptureSource { reader })
    }

    fn next_packet(&mut self) -> IexResult<Option<CapturedPacket>> {
        match &mut self.reader {
            CaptureReader::Pcap(r) => r.next_packet(),
            CaptureReader::PcapNg(r) => r.next_packet(),
        }
    }
}

impl PacketSource for CaptureSource {
    fn next_payload(&mut self) -> IexResult<Option<Vec<u8>>> {
        loop {
            let packet = match self.next_packet()? {
                Some(packet) => packet,
                None => return Ok(None),
            };
            trace!(
                timestamp = %packet.timestamp,
                len = packet.data.len(),
                "captured packet"
            );

            if packet.link_type != LINKTYPE_ETHERNET {
                return Err(IexError::Pcap(format!(
                    "unsupported link type {}",
                    packet.link_type
                )));
            }

            match SlicedPacket::from_ethernet(&packet.data) {
                Ok(sliced) => {
                    if matches!(sliced.transport, Some(TransportSlice::Udp(_)))
                        && !sliced.payload.is_empty()
                    {
                        return Ok(Some(sliced.payload.to_vec()));
                    }
                }
                Err(e) => {
                    warn!("skipping unparseable frame: {:?}", e);
                }
            }
        }
    }
}

/// Classic pcap: a 24-byte file header (magic already consumed), then
/// 16-byte record headers each followed by the captured bytes.
struct PcapReader {
    reader: Box<dyn Read + Send>,
    big_endian: bool,
    nanosecond: bool,
    link_type: u16,
}

impl PcapReader {
    fn new(
        mut reader: Box<dyn Read + Send>,
        big_endian: bool,
        nanosecond: bool,
    ) -> IexResult<PcapReader> {
        // version, thiszone, sigfigs, snaplen, network.
        let mut header = [0u8; 20];
        read_full(&mut reader, &mut header)?;
        let link_type = read_u32(&header[16..20], big_endian) as u16;
        Ok(PcapReader {
            reader,
            big_endian,
            nanosecond,
            link_type,
        })
    }

    fn next_packet(&mut self) -> IexResult<Option<CapturedPacket>> {
        let mut record = [0u8; 16];
        if !read_full_or_eof(&mut self.reader, &mut record)? {
            return Ok(None);
        }

        let ts_sec = read_u32(&record[0..4], self.big_endian);
        let ts_frac = read_u32(&record[4..8], self.big_endian);
        let incl_len = read_u32(&record[8..12], self.big_endian) as usize;
        if incl_len > MAX_BLOCK_LEN {
            return Err(IexError::Pcap(format!(
                "implausible packet length {}",
                incl_len
            )));
        }

        let mut data = vec![0u8; incl_len];
        read_full(&mut self.reader, &mut data)?;

        let nanos = if self.nanosecond {
            ts_frac as i64
        } else {
            ts_frac as i64 * 1_000
        };
        Ok(Some(CapturedPacket {
            timestamp: DateTime::from_timestamp_nanos(ts_sec as i64 * 1_000_000_000 + nanos),
            link_type: self.link_type,
            data,
        }))
    }
}

struct PcapNgInterface {
    link_type: u16,
    /// Duration of one timestamp unit, in nanoseconds.
    ts_unit_nanos: u64,
}

/// pcap-ng: a stream of typed blocks. Handles the minimum set needed for
/// IEX capture files (Section Header, Interface Description, Enhanced
/// Packet, Simple Packet, and the obsolete Packet Block); every other
/// block type is skipped.
struct PcapNgReader {
    reader: Box<dyn Read + Send>,
    big_endian: bool,
    interfaces: Vec<PcapNgInterface>,
}

impl PcapNgReader {
    /// `reader` is positioned just after the leading SHB block type.
    fn new(mut reader: Box<dyn Read + Send>) -> IexResult<PcapNgReader> {
        let mut head = [0u8; 8];
        read_full(&mut reader, &mut head)?;

        // The byte-order magic decides how to read every integer in the
        // section, including the total length we just consumed.
        let big_endian = match [head[4], head[5], head[6], head[7]] {
            [0x4d, 0x3c, 0x2b, 0x1a] => false,
            [0x1a, 0x2b, 0x3c, 0x4d] => true,
            bom => {
                return Err(IexError::Pcap(format!(
                    "bad section header byte-order magic {:02x?}",
                    bom
                )))
            }
        };

        let total_len = read_u32(&head[0..4], big_endian) as usize;
        check_block_len(total_len)?;
        // type + length + byte-order magic already consumed.
        skip(&mut reader, total_len - 12)?;

        Ok(PcapNgReader {
            reader,
            big_endian,
            interfaces: Vec::new(),
        })
    }

    fn next_packet(&mut self) -> IexResult<Option<CapturedPacket>> {
        loop {
            let mut head = [0u8; 8];
            if !read_full_or_eof(&mut self.reader, &mut head)? {
                return Ok(None);
            }

            let block_type = read_u32(&head[0..4], self.big_endian);

            if block_type == BLOCK_SECTION_HEADER {
                // A new section: re-detect byte order and drop the
                // previous section's interfaces.
                let mut bom = [0u8; 4];
                read_full(&mut self.reader, &mut bom)?;
                self.big_endian = match bom {
                    [0x4d, 0x3c, 0x2b, 0x1a] => false,
                    [0x1a, 0x2b, 0x3c, 0x4d] => true,
                    other => {
                        return Err(IexError::Pcap(format!(
                            "bad section header byte-order magic {:02x?}",
                            other
                        )))
                    }
                };
                let total_len = read_u32(&head[4..8], self.big_endian) as usize;
                check_block_len(total_len)?;
                skip(&mut self.reader, total_len - 12)?;
                self.interfaces.clear();
                continue;
            }

            let total_len = read_u32(&head[4..8], self.big_endian) as usize;
            check_block_len(total_len)?;
            // Body excludes the 8-byte head and the trailing length copy.
            let mut body = vec![0u8; total_len - 12];
            read_full(&mut self.reader, &mut body)?;
            skip(&mut self.reader, 4)?;

            match block_type {
                BLOCK_INTERFACE_DESCRIPTION => self.parse_interface(&body)?,
                BLOCK_ENHANCED_PACKET => {
                    if let Some(packet) = self.parse_enhanced_packet(&body)? {
                        return Ok(Some(packet));
                    }
                }
                BLOCK_SIMPLE_PACKET => {
                    if let Some(packet) = self.parse_simple_packet(&body)? {
                        return Ok(Some(packet));
                    }
                }
                BLOCK_PACKET => {
                    if let Some(packet) = self.parse_legacy_packet(&body)? {
                        return Ok(Some(packet));
                    }
                }
                other => {
                    trace!("skipping pcap-ng block type 0x{:08x}", other);
                }
            }
        }
    }

    fn parse_interface(&mut self, body: &[u8]) -> IexResult<()> {
        if body.len() < 8 {
            return Err(IexError::Pcap("interface description too short".to_string()));
        }
        let link_type = read_u16(&body[0..2], self.big_endian);

        // if_tsresol (option 9): one byte. The high bit selects a power
        // of two; otherwise it is a negative power of ten. Default is
        // microseconds.
        let mut ts_unit_nanos: u64 = 1_000;
        let mut options = &body[8..];
        while options.len() >= 4 {
            let code = read_u16(&options[0..2], self.big_endian);
            let len = read_u16(&options[2..4], self.big_endian) as usize;
            options = &options[4..];
            if options.len() < len {
                break;
            }
            if code == OPTION_IF_TSRESOL && len >= 1 {
                let resol = options[0];
                ts_unit_nanos = if resol & 0x80 != 0 {
                    // 2^-exp seconds per unit.
                    1_000_000_000u64 >> (resol & 0x7f).min(63)
                } else {
                    10u64.pow(9u32.saturating_sub(resol as u32).min(9))
                };
                ts_unit_nanos = ts_unit_nanos.max(1);
            }
            // Option values are padded to 4-byte boundaries.
            let padded = (len + 3) & !3;
            if options.len() < padded {
                break;
            }
            options = &options[padded..];
        }

        self.interfaces.push(PcapNgInterface {
            link_type,
            ts_unit_nanos,
        });
        Ok(())
    }

    fn interface(&self, id: usize) -> IexResult<&PcapNgInterface> {
        self.interfaces.get(id).ok_or_else(|| {
            IexError::Pcap(format!("packet references undescribed interface {}", id))
        })
    }

    fn parse_enhanced_packet(&self, body: &[u8]) -> IexResult<Option<CapturedPacket>> {
        if body.len() < 20 {
            return Err(IexError::Pcap("enhanced packet block too short".to_string()));
        }
        let interface_id = read_u32(&body[0..4], self.big_endian) as usize;
        let ts_high = read_u32(&body[4..8], self.big_endian);
        let ts_low = read_u32(&body[8..12], self.big_endian);
        let cap_len = read_u32(&body[12..16], self.big_endian) as usize;
        if body.len() < 20 + cap_len {
            return Err(IexError::Pcap("enhanced packet data truncated".to_string()));
        }

        let interface = self.interface(interface_id)?;
        let units = ((ts_high as u64) << 32) | ts_low as u64;
        Ok(Some(CapturedPacket {
            timestamp: DateTime::from_timestamp_nanos(
                (units * interface.ts_unit_nanos) as i64,
            ),
            link_type: interface.link_type,
            data: body[20..20 + cap_len].to_vec(),
        }))
    }

    fn parse_simple_packet(&self, body: &[u8]) -> IexResult<Option<CapturedPacket>> {
        if body.len() < 4 {
            return Err(IexError::Pcap("simple packet block too short".to_string()));
        }
        let orig_len = read_u32(&body[0..4], self.big_endian) as usize;
        let captured = orig_len.min(body.len() - 4);
        let interface = self.interface(0)?;

        // Simple packet blocks carry no timestamp; it stays at the epoch.
        Ok(Some(CapturedPacket {
            timestamp: DateTime::from_timestamp_nanos(0),
            link_type: interface.link_type,
            data: body[4..4 + captured].to_vec(),
        }))
    }

    fn parse_legacy_packet(&self, body: &[u8]) -> IexResult<Option<CapturedPacket>> {
        if body.len() < 20 {
            return Err(IexError::Pcap("packet block too short".to_string()));
        }
        let interface_id = read_u16(&body[0..2], self.big_endian) as usize;
        let ts_high = read_u32(&body[4..8], self.big_endian);
        let ts_low = read_u32(&body[8..12], self.big_endian);
        let cap_len = read_u32(&body[12..16], self.big_endian) as usize;
        if body.len() < 20 + cap_len {
            return Err(IexError::Pcap("packet block data truncated".to_string()));
        }

        let interface = self.interface(interface_id)?;
        let units = ((ts_high as u64) << 32) | ts_low as u64;
        Ok(Some(CapturedPacket {
            timestamp: DateTime::from_timestamp_nanos(
                (units * interface.ts_unit_nanos) as i64,
            ),
            link_type: interface.link_type,
            data: body[20..20 + cap_len].to_vec(),
        }))
    }
}

fn check_block_len(total_len: usize) -> IexResult<()> {
    if !(12..=MAX_BLOCK_LEN).contains(&total_len) || total_len % 4 != 0 {
        return Err(IexError::Pcap(format!("bad block length {}", total_len)));
    }
    Ok(())
}

fn read_u16(buf: &[u8], big_endian: bool) -> u16 {
    if big_endian {
        u16::from_be_bytes([buf[0], buf[1]])
    } else {
        u16::from_le_bytes([buf[0], buf[1]])
    }
}

fn read_u32(buf: &[u8], big_endian: bool) -> u32 {
    if big_endian {
        u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
    } else {
        u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
    }
}

/// Fill `buf` or fail: EOF anywhere inside is `UnexpectedEof`.
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> IexResult<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(IexError::UnexpectedEof);
        }
        filled += n;
    }
    Ok(())
}

/// Fill `buf`, returning false on a clean EOF before the first byte.
fn read_full_or_eof<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> IexResult<bool> {
    let n = reader.read(&mut buf[..1])?;
    if n == 0 {
        return Ok(false);
    }
    read_full(reader, &mut buf[1..])?;
    Ok(true)
}

fn skip<R: Read + ?Sized>(reader: &mut R, mut count: usize) -> IexResult<()> {
    let mut scratch = [0u8; 512];
    while count > 0 {
        let want = count.min(scratch.len());
        read_full(reader, &mut scratch[..want])?;
        count -= want;
    }
    Ok(())
}

/// A [`PacketSource`] over a live UDP socket: each datagram is one
/// segment payload. Never reports end of input.
pub struct UdpSource {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl UdpSource {
    /// Bind a UDP socket to the given local address.
    pub fn bind(addr: &str) -> IexResult<UdpSource> {
        Ok(UdpSource::from_socket(UdpSocket::bind(addr)?))
    }

    /// Wrap an already-configured socket (e.g. one joined to the IEX
    /// multicast group).
    pub fn from_socket(socket: UdpSocket) -> UdpSource {
        UdpSource {
            socket,
            buf: vec![0u8; 64 * 1024],
        }
    }
}

impl PacketSource for UdpSource {
    fn next_payload(&mut self) -> IexResult<Option<Vec<u8>>> {
        let n = self.socket.recv(&mut self.buf)?;
        Ok(Some(self.buf[..n].to_vec()))
    }
}

/// A [`PacketSource`] replaying a fixed sequence of payloads, for tests.
pub struct ReplaySource {
    payloads: VecDeque<Vec<u8>>,
}

impl ReplaySource {
    pub fn new<I: IntoIterator<Item = Vec<u8>>>(payloads: I) -> ReplaySource {
        ReplaySource {
            payloads: payloads.into_iter().collect(),
        }
    }
}

impl PacketSource for ReplaySource {
    fn next_payload(&mut self) -> IexResult<Option<Vec<u8>>> {
        Ok(self.payloads.pop_front())
    }
}

/// A high-level reader for extracting IEX-TP messages from a packet
/// source, in the order they appear on the wire.
///
/// Iterates lazily: one segment is decoded at a time, and segments with
/// no messages (heartbeats) are skipped. IEX's own published sample
/// captures end mid-record, so a truncated read at the outermost level is
/// reported as a clean end of stream; corruption anywhere else still
/// errors.
pub struct PcapScanner<S> {
    source: S,
    registry: Registry,
    current: std::vec::IntoIter<Message>,
}

impl<S: PacketSource> PcapScanner<S> {
    /// Scan with the default registry (TOPS and DEEP).
    pub fn new(source: S) -> PcapScanner<S> {
        PcapScanner::with_registry(source, Registry::default())
    }

    pub fn with_registry(source: S, registry: Registry) -> PcapScanner<S> {
        PcapScanner {
            source,
            registry,
            current: Vec::new().into_iter(),
        }
    }

    /// The next message in the stream, or `Ok(None)` at the end.
    pub fn next_message(&mut self) -> IexResult<Option<Message>> {
        loop {
            if let Some(msg) = self.current.next() {
                return Ok(Some(msg));
            }

            let payload = match self.source.next_payload() {
                Ok(Some(payload)) => payload,
                Ok(None) => return Ok(None),
                // Truncated capture tail, as found in IEX's sample files.
                Err(IexError::UnexpectedEof) => return Ok(None),
                Err(e) => return Err(e),
            };

            let segment = Segment::decode(&payload, &self.registry)?;
            self.current = segment.messages.into_iter();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iextp::tops::{self, SystemEventMessage, TradeReportMessage};
    use crate::iextp::SegmentHeader;
    use chrono::TimeZone;
    use etherparse::PacketBuilder;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn send_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 4, 17, 17, 0, 0).unwrap()
    }

    fn tops_segment(messages: &[Message]) -> Vec<u8> {
        let blocks: Vec<Vec<u8>> = messages.iter().map(|m| m.encode()).collect();
        let payload: Vec<u8> = blocks
            .iter()
            .flat_map(|b| {
                let mut block = (b.len() as u16).to_le_bytes().to_vec();
                block.extend_from_slice(b);
                block
            })
            .collect();

        let header = SegmentHeader {
            version: 1,
            message_protocol_id: tops::MESSAGE_PROTOCOL_ID,
            channel_id: 1,
            session_id: 42,
            payload_length: payload.len() as u16,
            message_count: messages.len() as u16,
            stream_offset: 0,
            first_message_sequence_number: 1,
            send_time: send_time(),
        };
        let mut out = header.encode();
        out.extend_from_slice(&payload);
        out
    }

    fn system_event() -> Message {
        Message::SystemEvent(SystemEventMessage {
            system_event: tops::START_OF_SYSTEM_HOURS,
            timestamp: send_time(),
        })
    }

    fn trade_report(symbol: &str) -> Message {
        Message::TradeReport(TradeReportMessage {
            sale_condition_flags: 0,
            timestamp: send_time(),
            symbol: symbol.to_string(),
            size: 100,
            price: 99.05,
            trade_id: 429974,
        })
    }

    fn udp_frame(payload: &[u8]) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv4([10, 0, 0, 1], [233, 215, 21, 4], 64)
            .udp(10378, 10378);
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, payload).unwrap();
        frame
    }

    fn classic_pcap(frames: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC_PCAP_LE_MICROS);
        out.extend_from_slice(&2u16.to_le_bytes()); // version major
        out.extend_from_slice(&4u16.to_le_bytes()); // version minor
        out.extend_from_slice(&0i32.to_le_bytes()); // thiszone
        out.extend_from_slice(&0u32.to_le_bytes()); // sigfigs
        out.extend_from_slice(&65535u32.to_le_bytes()); // snaplen
        out.extend_from_slice(&u32::from(LINKTYPE_ETHERNET).to_le_bytes());
        for frame in frames {
            out.extend_from_slice(&1_492_448_400u32.to_le_bytes()); // ts_sec
            out.extend_from_slice(&0u32.to_le_bytes()); // ts_usec
            out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            out.extend_from_slice(frame);
        }
        out
    }

    fn pcapng(frames: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();

        // Section header block.
        let shb_len = 28u32;
        out.extend_from_slice(&BLOCK_SECTION_HEADER.to_le_bytes());
        out.extend_from_slice(&shb_len.to_le_bytes());
        out.extend_from_slice(&[0x4d, 0x3c, 0x2b, 0x1a]); // byte-order magic
        out.extend_from_slice(&1u16.to_le_bytes()); // major
        out.extend_from_slice(&0u16.to_le_bytes()); // minor
        out.extend_from_slice(&(-1i64).to_le_bytes()); // section length
        out.extend_from_slice(&shb_len.to_le_bytes());

        // Interface description block, no options.
        let idb_len = 20u32;
        out.extend_from_slice(&BLOCK_INTERFACE_DESCRIPTION.to_le_bytes());
        out.extend_from_slice(&idb_len.to_le_bytes());
        out.extend_from_slice(&LINKTYPE_ETHERNET.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // reserved
        out.extend_from_slice(&65535u32.to_le_bytes()); // snaplen
        out.extend_from_slice(&idb_len.to_le_bytes());

        // Enhanced packet blocks.
        for frame in frames {
            let padded = (frame.len() + 3) & !3;
            let epb_len = (32 + padded) as u32;
            out.extend_from_slice(&BLOCK_ENHANCED_PACKET.to_le_bytes());
            out.extend_from_slice(&epb_len.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes()); // interface id
            out.extend_from_slice(&0u32.to_le_bytes()); // ts high
            out.extend_from_slice(&0u32.to_le_bytes()); // ts low
            out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            out.extend_from_slice(frame);
            out.extend_from_slice(&vec![0u8; padded - frame.len()]);
            out.extend_from_slice(&epb_len.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_replay_source_scans_messages() {
        let source = ReplaySource::new(vec![
            tops_segment(&[system_event()]),
            tops_segment(&[trade_report("ZIEXT"), trade_report("AAPL")]),
        ]);
        let mut scanner = PcapScanner::new(source);

        assert!(matches!(
            scanner.next_message().unwrap(),
            Some(Message::SystemEvent(_))
        ));
        let trade = scanner.next_message().unwrap().unwrap();
        assert_eq!(trade.symbol(), Some("ZIEXT"));
        assert_eq!(trade.timestamp(), Some(send_time()));
        let trade = scanner.next_message().unwrap().unwrap();
        assert_eq!(trade.symbol(), Some("AAPL"));
        assert!(scanner.next_message().unwrap().is_none());
    }

    #[test]
    fn test_udp_source_yields_datagrams() {
        let mut source = UdpSource::bind("127.0.0.1:0").unwrap();
        let addr = source.socket.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let segment = tops_segment(&[trade_report("ZIEXT")]);
        sender.send_to(&segment, addr).unwrap();

        let payload = source.next_payload().unwrap().unwrap();
        assert_eq!(payload, segment);

        let mut scanner = PcapScanner::new(ReplaySource::new(vec![payload]));
        assert_eq!(
            scanner.next_message().unwrap().unwrap().symbol(),
            Some("ZIEXT")
        );
    }

    #[test]
    fn test_scanner_skips_empty_segments() {
        let source = ReplaySource::new(vec![
            tops_segment(&[]),
            tops_segment(&[]),
            tops_segment(&[system_event()]),
            tops_segment(&[]),
        ]);
        let mut scanner = PcapScanner::new(source);

        assert!(scanner.next_message().unwrap().is_some());
        assert!(scanner.next_message().unwrap().is_none());
    }

    #[test]
    fn test_classic_pcap_round_trip() {
        let capture = classic_pcap(&[
            udp_frame(&tops_segment(&[system_event()])),
            udp_frame(&tops_segment(&[trade_report("ZIEXT")])),
        ]);

        let source = CaptureSource::new(Cursor::new(capture)).unwrap();
        let mut scanner = PcapScanner::new(source);

        assert!(matches!(
            scanner.next_message().unwrap(),
            Some(Message::SystemEvent(_))
        ));
        assert_eq!(
            scanner.next_message().unwrap().unwrap().symbol(),
            Some("ZIEXT")
        );
        assert!(scanner.next_message().unwrap().is_none());
    }

    #[test]
    fn test_gzipped_pcap_round_trip() {
        let capture = classic_pcap(&[udp_frame(&tops_segment(&[trade_report("FB")]))]);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&capture).unwrap();
        let gzipped = encoder.finish().unwrap();

        let source = CaptureSource::new(Cursor::new(gzipped)).unwrap();
        let mut scanner = PcapScanner::new(source);

        assert_eq!(scanner.next_message().unwrap().unwrap().symbol(), Some("FB"));
        assert!(scanner.next_message().unwrap().is_none());
    }

    #[test]
    fn test_pcapng_round_trip() {
        let capture = pcapng(&[
            udp_frame(&tops_segment(&[system_event()])),
            udp_frame(&tops_segment(&[trade_report("SNAP")])),
        ]);

        let source = CaptureSource::new(Cursor::new(capture)).unwrap();
        let mut scanner = PcapScanner::new(source);

        assert!(matches!(
            scanner.next_message().unwrap(),
            Some(Message::SystemEvent(_))
        ));
        assert_eq!(
            scanner.next_message().unwrap().unwrap().symbol(),
            Some("SNAP")
        );
        assert!(scanner.next_message().unwrap().is_none());
    }

    #[test]
    fn test_pcapng_simple_packet_block() {
        let frame = udp_frame(&tops_segment(&[trade_report("FB")]));
        let mut capture = pcapng(&[]);

        let padded = (frame.len() + 3) & !3;
        let spb_len = (16 + padded) as u32;
        capture.extend_from_slice(&BLOCK_SIMPLE_PACKET.to_le_bytes());
        capture.extend_from_slice(&spb_len.to_le_bytes());
        capture.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        capture.extend_from_slice(&frame);
        capture.extend_from_slice(&vec![0u8; padded - frame.len()]);
        capture.extend_from_slice(&spb_len.to_le_bytes());

        let source = CaptureSource::new(Cursor::new(capture)).unwrap();
        let mut scanner = PcapScanner::new(source);

        assert_eq!(scanner.next_message().unwrap().unwrap().symbol(), Some("FB"));
        assert!(scanner.next_message().unwrap().is_none());
    }

    #[test]
    fn test_truncated_capture_is_clean_eof() {
        let mut capture = classic_pcap(&[udp_frame(&tops_segment(&[system_event()]))]);
        let full_len = capture.len();
        let second_record = capture[24..full_len].to_vec();
        capture.extend_from_slice(&second_record);
        capture.truncate(full_len + 20); // cut inside the second record

        let source = CaptureSource::new(Cursor::new(capture)).unwrap();
        let mut scanner = PcapScanner::new(source);

        assert!(scanner.next_message().unwrap().is_some());
        assert!(scanner.next_message().unwrap().is_none());
    }

    #[test]
    fn test_unrecognized_magic() {
        match CaptureSource::new(Cursor::new(vec![0u8; 64])) {
            Err(IexError::Pcap(_)) => {}
            other => panic!("expected Pcap error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_non_udp_frames_are_skipped() {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .tcp(443, 50000, 0, 1024);
        let mut tcp_frame = Vec::new();
        builder.write(&mut tcp_frame, b"not market data").unwrap();

        let capture = classic_pcap(&[
            tcp_frame,
            udp_frame(&tops_segment(&[trade_report("ZIEXT")])),
        ]);

        let source = CaptureSource::new(Cursor::new(capture)).unwrap();
        let mut scanner = PcapScanner::new(source);

        assert_eq!(
            scanner.next_message().unwrap().unwrap().symbol(),
            Some("ZIEXT")
        );
        assert!(scanner.next_message().unwrap().is_none());
    }
}
