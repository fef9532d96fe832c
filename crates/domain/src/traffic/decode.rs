//! Link-layer frame decoding for the capture pipeline.

use std::net::IpAddr;

use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::{TcpFlags as PnetTcpFlags, TcpPacket};

/// Largest frame length the accounting accepts. Anything above is treated
/// as malformed capture data.
pub const MAX_FRAME_LEN: u64 = 65_535;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
}

/// Everything the aggregator needs from one captured frame.
#[derive(Debug, Clone, Copy)]
pub struct PacketMeta {
    pub src: IpAddr,
    pub dst: IpAddr,
    /// Raw captured byte count, link-layer overhead included. The IP
    /// header's own length field excludes that overhead and has been a
    /// source of under-counting.
    pub frame_len: u64,
    /// Present only for TCP segments.
    pub tcp: Option<TcpFlags>,
}

/// Decode an ethernet frame into accounting metadata.
///
/// Admits TCP and UDP over IPv4/IPv6 only; everything else returns `None`,
/// as do zero-length and oversized frames.
pub fn decode_frame(frame: &[u8]) -> Option<PacketMeta> {
    let frame_len = frame.len() as u64;
    if frame_len == 0 || frame_len > MAX_FRAME_LEN {
        return None;
    }

    let eth = EthernetPacket::new(frame)?;
    let (src, dst, proto, l4): (IpAddr, IpAddr, IpNextHeaderProtocol, &[u8]) =
        match eth.get_ethertype() {
            EtherTypes::Ipv4 => {
                let ip = Ipv4Packet::new(eth.payload())?;
                (
                    IpAddr::V4(ip.get_source()),
                    IpAddr::V4(ip.get_destination()),
                    ip.get_next_level_protocol(),
                    &eth.payload()[(usize::from(ip.get_header_length()) * 4).min(eth.payload().len())..],
                )
            }
            EtherTypes::Ipv6 => {
                let ip = Ipv6Packet::new(eth.payload())?;
                (
                    IpAddr::V6(ip.get_source()),
                    IpAddr::V6(ip.get_destination()),
                    ip.get_next_header(),
                    &eth.payload()[Ipv6Packet::minimum_packet_size().min(eth.payload().len())..],
                )
            }
            _ => return None,
        };

    let tcp = match proto {
        IpNextHeaderProtocols::Tcp => {
            let tcp = TcpPacket::new(l4)?;
            let flags = tcp.get_flags();
            Some(TcpFlags {
                syn: flags & PnetTcpFlags::SYN != 0,
                ack: flags & PnetTcpFlags::ACK != 0,
                fin: flags & PnetTcpFlags::FIN != 0,
                rst: flags & PnetTcpFlags::RST != 0,
            })
        }
        IpNextHeaderProtocols::Udp => None,
        _ => return None,
    };

    Some(PacketMeta {
        src,
        dst,
        frame_len,
        tcp,
    })
}
