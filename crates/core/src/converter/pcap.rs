//! Packet captures, classic libpcap and pcapng.
//!
//! Frames are decoded down to the transport layer: link header, IPv4/IPv6
//! addresses and TCP/UDP ports. Anything deeper is left to dedicated tools.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::fs::File;
use std::io::{BufReader, ErrorKind as IoErrorKind, Read};
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::dispatch::Dispatcher;
use crate::fingerprint::TypeTag;

use super::error::ConverterError;
use super::traits::{run_blocking, Converter};
use super::types::ConversionTask;

/// Frames larger than this are treated as corruption rather than allocated.
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

const PCAPNG_SHB: u32 = 0x0A0D_0D0A;
const PCAPNG_IDB: u32 = 0x0000_0001;
const PCAPNG_SPB: u32 = 0x0000_0003;
const PCAPNG_EPB: u32 = 0x0000_0006;
const PCAPNG_BYTE_ORDER: u32 = 0x1A2B_3C4D;
const OPT_IF_TSRESOL: u16 = 9;

pub struct PcapConverter;

#[async_trait]
impl Converter for PcapConverter {
    fn name(&self) -> &str {
        "pcap"
    }

    fn supported_types(&self) -> &[TypeTag] {
        &[TypeTag::Pcap, TypeTag::Pcapng]
    }

    async fn convert(&self, task: &ConversionTask, ctx: &Dispatcher) -> Result<Value, ConverterError> {
        let path = task.content_path.clone();
        let max_packets = ctx.config().max_packets;
        run_blocking(move || {
            let file = File::open(&path).map_err(|e| ConverterError::unreadable(&path, e))?;
            parse_capture(BufReader::new(file), max_packets)
        })
        .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u16(self, b: &[u8]) -> u16 {
        let raw = [b[0], b[1]];
        match self {
            Self::Little => u16::from_le_bytes(raw),
            Self::Big => u16::from_be_bytes(raw),
        }
    }

    fn u32(self, b: &[u8]) -> u32 {
        let raw = [b[0], b[1], b[2], b[3]];
        match self {
            Self::Little => u32::from_le_bytes(raw),
            Self::Big => u32::from_be_bytes(raw),
        }
    }
}

/// One captured frame.
#[derive(Debug)]
struct Frame {
    timestamp: f64,
    length: u32,
    link_type: u16,
    data: Vec<u8>,
}

/// Accumulates decoded packets up to the cap.
struct Collector {
    packets: Vec<Value>,
    max_packets: usize,
    truncated: bool,
    link_type: Option<u16>,
}

impl Collector {
    fn new(max_packets: usize) -> Self {
        Self {
            packets: Vec::new(),
            max_packets,
            truncated: false,
            link_type: None,
        }
    }

    /// Returns false once the cap is reached.
    fn push(&mut self, frame: Frame) -> bool {
        if self.packets.len() >= self.max_packets {
            self.truncated = true;
            return false;
        }
        self.link_type.get_or_insert(frame.link_type);
        let index = self.packets.len();
        self.packets.push(decode_frame(index, &frame));
        true
    }

    fn finish(self) -> Value {
        json!({
            "packet_count": self.packets.len(),
            "packets": self.packets,
            "truncated": self.truncated,
            "link_type": self.link_type.map(link_type_name),
            "extraction_method": "native",
        })
    }
}

pub(crate) fn parse_capture<R: Read>(mut reader: R, max_packets: usize) -> Result<Value, ConverterError> {
    let magic = read_exact_or_eof(&mut reader, 4)?
        .ok_or_else(|| ConverterError::corrupt("capture is empty"))?;
    let mut collector = Collector::new(max_packets);

    match magic.as_slice() {
        [0x0A, 0x0D, 0x0D, 0x0A] => read_pcapng(&mut reader, &mut collector)?,
        _ => read_classic(&mut reader, &magic, &mut collector)?,
    }
    Ok(collector.finish())
}

fn read_classic<R: Read>(
    reader: &mut R,
    magic: &[u8],
    collector: &mut Collector,
) -> Result<(), ConverterError> {
    let (endian, nanos) = match magic {
        [0xA1, 0xB2, 0xC3, 0xD4] => (Endian::Big, false),
        [0xD4, 0xC3, 0xB2, 0xA1] => (Endian::Little, false),
        [0xA1, 0xB2, 0x3C, 0x4D] => (Endian::Big, true),
        [0x4D, 0x3C, 0xB2, 0xA1] => (Endian::Little, true),
        _ => return Err(ConverterError::corrupt("unrecognised capture magic")),
    };

    let header = read_exact_or_eof(reader, 20)?
        .ok_or_else(|| ConverterError::corrupt("truncated pcap global header"))?;
    let link_type = (endian.u32(&header[16..20]) & 0xFFFF) as u16;
    let divisor = if nanos { 1e9 } else { 1e6 };

    while let Some(record) = read_exact_or_eof(reader, 16)? {
        let ts_sec = endian.u32(&record[0..4]);
        let ts_frac = endian.u32(&record[4..8]);
        let incl_len = endian.u32(&record[8..12]);
        let orig_len = endian.u32(&record[12..16]);
        if incl_len > MAX_FRAME_LEN {
            return Err(ConverterError::corrupt(format!(
                "packet record claims {incl_len} bytes"
            )));
        }
        let Some(data) = read_exact_or_eof(reader, incl_len as usize)? else {
            break;
        };
        let frame = Frame {
            timestamp: f64::from(ts_sec) + f64::from(ts_frac) / divisor,
            length: orig_len,
            link_type,
            data,
        };
        if !collector.push(frame) {
            break;
        }
    }
    Ok(())
}

/// Interface description needed to interpret enhanced packet blocks.
#[derive(Debug, Clone, Copy)]
struct Interface {
    link_type: u16,
    /// Timestamp units per second.
    units_per_sec: f64,
}

fn read_pcapng<R: Read>(reader: &mut R, collector: &mut Collector) -> Result<(), ConverterError> {
    // The section header's type has already been consumed.
    let mut block_type = PCAPNG_SHB;
    let mut endian = Endian::Little;
    let mut interfaces: Vec<Interface> = Vec::new();

    loop {
        let Some(len_raw) = read_exact_or_eof(reader, 4)? else {
            break;
        };

        if block_type == PCAPNG_SHB {
            let Some(bom) = read_exact_or_eof(reader, 4)? else {
                break;
            };
            endian = match Endian::Big.u32(&bom) {
                PCAPNG_BYTE_ORDER => Endian::Big,
                0x4D3C_2B1A => Endian::Little,
                _ => return Err(ConverterError::corrupt("bad pcapng byte-order magic")),
            };
            interfaces.clear();
            let total = endian.u32(&len_raw);
            if total < 28 || total % 4 != 0 || total > MAX_FRAME_LEN {
                return Err(ConverterError::corrupt("bad pcapng section header length"));
            }
            // Version, section length, options and the trailing length.
            if read_exact_or_eof(reader, total as usize - 12)?.is_none() {
                break;
            }
        } else {
            let total = endian.u32(&len_raw);
            if total < 12 || total % 4 != 0 || total > MAX_FRAME_LEN {
                return Err(ConverterError::corrupt(format!(
                    "bad pcapng block length {total}"
                )));
            }
            let Some(body) = read_exact_or_eof(reader, total as usize - 8)? else {
                break;
            };
            // Drop the trailing length copy.
            let body = &body[..body.len() - 4];

            match block_type {
                PCAPNG_IDB => interfaces.push(parse_interface(body, endian)?),
                PCAPNG_EPB => {
                    if let Some(frame) = parse_enhanced(body, endian, &interfaces)? {
                        if !collector.push(frame) {
                            break;
                        }
                    }
                }
                PCAPNG_SPB => {
                    if let Some(frame) = parse_simple(body, endian, &interfaces) {
                        if !collector.push(frame) {
                            break;
                        }
                    }
                }
                _ => {}
            }
        }

        let Some(next) = read_exact_or_eof(reader, 4)? else {
            break;
        };
        block_type = endian.u32(&next);
    }
    Ok(())
}

fn parse_interface(body: &[u8], endian: Endian) -> Result<Interface, ConverterError> {
    if body.len() < 8 {
        return Err(ConverterError::corrupt("truncated interface description block"));
    }
    let link_type = endian.u16(&body[0..2]);
    let mut units_per_sec = 1e6;

    let mut options = &body[8..];
    while options.len() >= 4 {
        let code = endian.u16(&options[0..2]);
        let len = endian.u16(&options[2..4]) as usize;
        if code == 0 {
            break;
        }
        let padded = (len + 3) & !3;
        if options.len() < 4 + padded {
            break;
        }
        if code == OPT_IF_TSRESOL && len >= 1 {
            let resol = options[4];
            units_per_sec = if resol & 0x80 == 0 {
                10f64.powi(i32::from(resol))
            } else {
                2f64.powi(i32::from(resol & 0x7F))
            };
        }
        options = &options[4 + padded..];
    }

    Ok(Interface {
        link_type,
        units_per_sec,
    })
}

fn parse_enhanced(
    body: &[u8],
    endian: Endian,
    interfaces: &[Interface],
) -> Result<Option<Frame>, ConverterError> {
    if body.len() < 20 {
        return Err(ConverterError::corrupt("truncated enhanced packet block"));
    }
    let interface_id = endian.u32(&body[0..4]) as usize;
    let Some(interface) = interfaces.get(interface_id) else {
        return Ok(None);
    };
    let ts = (u64::from(endian.u32(&body[4..8])) << 32) | u64::from(endian.u32(&body[8..12]));
    let cap_len = endian.u32(&body[12..16]) as usize;
    let orig_len = endian.u32(&body[16..20]);
    let data = body
        .get(20..20 + cap_len)
        .ok_or_else(|| ConverterError::corrupt("enhanced packet overruns its block"))?;

    Ok(Some(Frame {
        timestamp: ts as f64 / interface.units_per_sec,
        length: orig_len,
        link_type: interface.link_type,
        data: data.to_vec(),
    }))
}

fn parse_simple(body: &[u8], endian: Endian, interfaces: &[Interface]) -> Option<Frame> {
    let interface = interfaces.first()?;
    if body.len() < 4 {
        return None;
    }
    let orig_len = endian.u32(&body[0..4]);
    let captured = (orig_len as usize).min(body.len() - 4);
    Some(Frame {
        timestamp: 0.0,
        length: orig_len,
        link_type: interface.link_type,
        data: body[4..4 + captured].to_vec(),
    })
}

/// Reads exactly `n` bytes; `None` when the input ends first.
fn read_exact_or_eof<R: Read>(reader: &mut R, n: usize) -> Result<Option<Vec<u8>>, ConverterError> {
    let mut buf = vec![0u8; n];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(Some(buf)),
        Err(e) if e.kind() == IoErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(ConverterError::Io(e)),
    }
}

fn link_type_name(link_type: u16) -> String {
    match link_type {
        0 => "null".to_string(),
        1 => "ethernet".to_string(),
        101 | 228 | 229 => "raw".to_string(),
        113 => "linux_sll".to_string(),
        276 => "linux_sll2".to_string(),
        other => format!("linktype_{other}"),
    }
}

#[derive(Debug, Default)]
struct Decoded {
    protocol: &'static str,
    src_ip: Option<String>,
    dst_ip: Option<String>,
    ip_protocol: Option<u8>,
    src_port: Option<u16>,
    dst_port: Option<u16>,
}

fn decode_frame(index: usize, frame: &Frame) -> Value {
    let decoded = decode_link(frame.link_type, &frame.data);

    let summary = match (&decoded.src_ip, &decoded.dst_ip) {
        (Some(src), Some(dst)) => match (decoded.src_port, decoded.dst_port) {
            (Some(sp), Some(dp)) => format!("{} {src}:{sp} -> {dst}:{dp}", decoded.protocol),
            _ => format!("{} {src} -> {dst}", decoded.protocol),
        },
        _ => decoded.protocol.to_string(),
    };

    json!({
        "index": index,
        "timestamp": frame.timestamp,
        "length": frame.length,
        "captured_length": frame.data.len(),
        "protocol": decoded.protocol,
        "src_ip": decoded.src_ip,
        "dst_ip": decoded.dst_ip,
        "ip_protocol": decoded.ip_protocol,
        "src_port": decoded.src_port,
        "dst_port": decoded.dst_port,
        "summary": format!("{summary} len={}", frame.length),
    })
}

fn decode_link(link_type: u16, data: &[u8]) -> Decoded {
    match link_type {
        1 => decode_ethernet(data),
        0 => match data.get(0..4) {
            Some(family) => {
                let le = u32::from_le_bytes([family[0], family[1], family[2], family[3]]);
                let be = u32::from_be_bytes([family[0], family[1], family[2], family[3]]);
                match (le, be) {
                    (2, _) | (_, 2) => decode_ipv4(&data[4..]),
                    (24 | 28 | 30, _) | (_, 24 | 28 | 30) => decode_ipv6(&data[4..]),
                    _ => unknown("null"),
                }
            }
            None => unknown("null"),
        },
        101 | 228 | 229 => decode_raw_ip(data),
        113 => match data.get(14..16) {
            Some(p) => decode_ethertype(u16::from_be_bytes([p[0], p[1]]), &data[16..]),
            None => unknown("linux_sll"),
        },
        276 => match data.get(0..2) {
            Some(p) if data.len() >= 20 => {
                decode_ethertype(u16::from_be_bytes([p[0], p[1]]), &data[20..])
            }
            _ => unknown("linux_sll2"),
        },
        _ => unknown("unknown"),
    }
}

fn unknown(protocol: &'static str) -> Decoded {
    Decoded {
        protocol,
        ..Default::default()
    }
}

fn decode_ethernet(data: &[u8]) -> Decoded {
    let Some(ethertype) = data.get(12..14) else {
        return unknown("Ethernet");
    };
    let mut ethertype = u16::from_be_bytes([ethertype[0], ethertype[1]]);
    let mut offset = 14;
    while matches!(ethertype, 0x8100 | 0x88A8) {
        let Some(inner) = data.get(offset + 2..offset + 4) else {
            return unknown("VLAN");
        };
        ethertype = u16::from_be_bytes([inner[0], inner[1]]);
        offset += 4;
    }
    decode_ethertype(ethertype, &data[offset..])
}

fn decode_ethertype(ethertype: u16, payload: &[u8]) -> Decoded {
    match ethertype {
        0x0800 => decode_ipv4(payload),
        0x86DD => decode_ipv6(payload),
        0x0806 => unknown("ARP"),
        _ => unknown("Ethernet"),
    }
}

fn decode_raw_ip(data: &[u8]) -> Decoded {
    match data.first().map(|b| b >> 4) {
        Some(4) => decode_ipv4(data),
        Some(6) => decode_ipv6(data),
        _ => unknown("unknown"),
    }
}

fn decode_ipv4(data: &[u8]) -> Decoded {
    if data.len() < 20 {
        return unknown("IPv4");
    }
    let ihl = usize::from(data[0] & 0x0F) * 4;
    let proto = data[9];
    let src = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
    let dst = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
    let transport = data.get(ihl.max(20)..).unwrap_or_default();
    with_transport(proto, transport, src.to_string(), dst.to_string(), "IPv4")
}

fn decode_ipv6(data: &[u8]) -> Decoded {
    if data.len() < 40 {
        return unknown("IPv6");
    }
    let next_header = data[6];
    let mut src = [0u8; 16];
    let mut dst = [0u8; 16];
    src.copy_from_slice(&data[8..24]);
    dst.copy_from_slice(&data[24..40]);
    with_transport(
        next_header,
        &data[40..],
        Ipv6Addr::from(src).to_string(),
        Ipv6Addr::from(dst).to_string(),
        "IPv6",
    )
}

fn with_transport(
    proto: u8,
    transport: &[u8],
    src_ip: String,
    dst_ip: String,
    network: &'static str,
) -> Decoded {
    let protocol = match proto {
        1 => "ICMP",
        6 => "TCP",
        17 => "UDP",
        58 => "ICMPv6",
        _ => network,
    };
    let ports = match (proto, transport.get(0..4)) {
        (6 | 17, Some(p)) => Some((
            u16::from_be_bytes([p[0], p[1]]),
            u16::from_be_bytes([p[2], p[3]]),
        )),
        _ => None,
    };
    Decoded {
        protocol,
        src_ip: Some(src_ip),
        dst_ip: Some(dst_ip),
        ip_protocol: Some(proto),
        src_port: ports.map(|p| p.0),
        dst_port: ports.map(|p| p.1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ErrorKind;

    /// Ethernet + IPv4 + TCP 10.0.0.1:1234 -> 10.0.0.2:80.
    fn tcp_frame() -> Vec<u8> {
        let mut f = vec![0u8; 12];
        f.extend_from_slice(&[0x08, 0x00]);
        let mut ip = vec![0x45, 0, 0, 40, 0, 0, 0, 0, 64, 6, 0, 0];
        ip.extend_from_slice(&[10, 0, 0, 1, 10, 0, 0, 2]);
        f.extend_from_slice(&ip);
        f.extend_from_slice(&1234u16.to_be_bytes());
        f.extend_from_slice(&80u16.to_be_bytes());
        f.extend_from_slice(&[0u8; 16]);
        f
    }

    fn classic_capture(frames: usize) -> Vec<u8> {
        let mut out = vec![0xD4, 0xC3, 0xB2, 0xA1];
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&65535u32.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        for i in 0..frames {
            let frame = tcp_frame();
            out.extend_from_slice(&(1_700_000_000u32 + i as u32).to_le_bytes());
            out.extend_from_slice(&500_000u32.to_le_bytes());
            out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            out.extend_from_slice(&frame);
        }
        out
    }

    fn block(block_type: u32, body: &[u8]) -> Vec<u8> {
        let total = (12 + body.len()) as u32;
        let mut out = block_type.to_le_bytes().to_vec();
        out.extend_from_slice(&total.to_le_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(&total.to_le_bytes());
        out
    }

    #[test]
    fn test_classic_capture() {
        let data = parse_capture(&classic_capture(2)[..], 100).unwrap();
        assert_eq!(data["packet_count"], 2);
        assert_eq!(data["link_type"], "ethernet");
        let p = &data["packets"][0];
        assert_eq!(p["protocol"], "TCP");
        assert_eq!(p["src_ip"], "10.0.0.1");
        assert_eq!(p["dst_port"], 80);
        assert_eq!(p["ip_protocol"], 6);
        assert_eq!(p["timestamp"], 1_700_000_000.5);
        assert!(p["summary"].as_str().unwrap().starts_with("TCP 10.0.0.1:1234 -> 10.0.0.2:80"));
    }

    #[test]
    fn test_packet_cap() {
        let data = parse_capture(&classic_capture(5)[..], 3).unwrap();
        assert_eq!(data["packet_count"], 3);
        assert_eq!(data["truncated"], true);
    }

    #[test]
    fn test_truncated_last_record_is_dropped() {
        let mut bytes = classic_capture(2);
        bytes.truncate(bytes.len() - 10);
        let data = parse_capture(&bytes[..], 100).unwrap();
        assert_eq!(data["packet_count"], 1);
    }

    #[test]
    fn test_pcapng_with_nanosecond_resolution() {
        let mut shb = PCAPNG_BYTE_ORDER.to_le_bytes().to_vec();
        shb.extend_from_slice(&1u16.to_le_bytes());
        shb.extend_from_slice(&0u16.to_le_bytes());
        shb.extend_from_slice(&(-1i64).to_le_bytes());

        let mut idb = 1u16.to_le_bytes().to_vec();
        idb.extend_from_slice(&[0, 0]);
        idb.extend_from_slice(&0u32.to_le_bytes());
        idb.extend_from_slice(&OPT_IF_TSRESOL.to_le_bytes());
        idb.extend_from_slice(&1u16.to_le_bytes());
        idb.extend_from_slice(&[9, 0, 0, 0]);
        idb.extend_from_slice(&[0, 0, 0, 0]);

        let frame = tcp_frame();
        let ts: u64 = 1_700_000_000_250_000_000;
        let mut epb = 0u32.to_le_bytes().to_vec();
        epb.extend_from_slice(&((ts >> 32) as u32).to_le_bytes());
        epb.extend_from_slice(&(ts as u32).to_le_bytes());
        epb.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        epb.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        epb.extend_from_slice(&frame);
        while epb.len() % 4 != 0 {
            epb.push(0);
        }

        let mut bytes = block(PCAPNG_SHB, &shb);
        bytes.extend(block(PCAPNG_IDB, &idb));
        bytes.extend(block(PCAPNG_EPB, &epb));

        let data = parse_capture(&bytes[..], 100).unwrap();
        assert_eq!(data["packet_count"], 1);
        assert_eq!(data["packets"][0]["protocol"], "TCP");
        let ts = data["packets"][0]["timestamp"].as_f64().unwrap();
        assert!((ts - 1_700_000_000.25).abs() < 1e-3);
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let err = parse_capture(&[0x13u8, 0x37, 0x00, 0x00, 0x01][..], 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptInput);
        let err = parse_capture(&[][..], 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptInput);
    }

    #[test]
    fn test_raw_ipv6_udp() {
        let mut pkt = vec![0x60, 0, 0, 0, 0, 8, 17, 64];
        pkt.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        pkt.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        pkt.extend_from_slice(&53u16.to_be_bytes());
        pkt.extend_from_slice(&5353u16.to_be_bytes());
        let decoded = decode_link(101, &pkt);
        assert_eq!(decoded.protocol, "UDP");
        assert_eq!(decoded.src_ip.as_deref(), Some("::1"));
        assert_eq!(decoded.dst_port, Some(5353));
    }
}
