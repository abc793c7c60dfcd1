// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! OSC client registry and best-effort UDP transmission.
//!
//! Subscribers register an IP address and receive parameter and meter
//! updates as OSC 1.0 messages on the configured port. Transmission is
//! fire-and-forget: a full socket buffer or an unreachable client is
//! silently dropped, never blocking the sender.

use crate::config::OscSettings;
use parking_lot::Mutex;
use rosc::{encoder, OscMessage, OscPacket, OscType};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Fixed-size set of OSC subscriber addresses plus the sending socket.
pub struct OscRegistry {
    socket: Option<UdpSocket>,
    clients: Mutex<Vec<Option<SocketAddr>>>,
    active: AtomicBool,
    port: u16,
}

impl OscRegistry {
    /// Create a registry. A socket bind failure downgrades to a no-op
    /// registry rather than failing engine startup.
    pub fn new(settings: &OscSettings) -> Self {
        let socket = match UdpSocket::bind(("0.0.0.0", 0)) {
            Ok(socket) => {
                if let Err(e) = socket.set_nonblocking(true) {
                    warn!("Failed to set OSC socket non-blocking: {}", e);
                }
                Some(socket)
            }
            Err(e) => {
                warn!("Failed to bind OSC socket, updates disabled: {}", e);
                None
            }
        };

        Self {
            socket,
            clients: Mutex::new(vec![None; settings.max_clients]),
            active: AtomicBool::new(false),
            port: settings.port,
        }
    }

    /// Register a client address. Returns the slot index, or `None` when the
    /// address does not parse or the registry is full.
    pub fn add_client(&self, address: &str) -> Option<usize> {
        let ip: IpAddr = match address.parse() {
            Ok(ip) => ip,
            Err(_) => {
                warn!("Failed to register OSC client {}", address);
                return None;
            }
        };
        let addr = SocketAddr::new(ip, self.port);

        let mut clients = self.clients.lock();
        if clients.iter().any(|c| *c == Some(addr)) {
            return clients.iter().position(|c| *c == Some(addr));
        }
        let slot = clients.iter().position(|c| c.is_none())?;
        clients[slot] = Some(addr);
        self.active.store(true, Ordering::Relaxed);
        info!("Added OSC client {}: {}", slot, address);
        Some(slot)
    }

    /// Remove a client address if registered.
    pub fn remove_client(&self, address: &str) {
        let ip: IpAddr = match address.parse() {
            Ok(ip) => ip,
            Err(_) => return,
        };
        let addr = SocketAddr::new(ip, self.port);

        let mut clients = self.clients.lock();
        for (slot, client) in clients.iter_mut().enumerate() {
            if *client == Some(addr) {
                *client = None;
                info!("Removed OSC client {}: {}", slot, address);
            }
        }
        let any = clients.iter().any(|c| c.is_some());
        self.active.store(any, Ordering::Relaxed);
    }

    /// Whether at least one client is registered. Cheap enough to gate the
    /// meter publisher's scan.
    pub fn has_clients(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Send a single-float message to every registered client.
    pub fn send_float(&self, path: &str, value: f32) {
        self.send(path, OscType::Float(value));
    }

    /// Send a single-int message to every registered client.
    pub fn send_int(&self, path: &str, value: i32) {
        self.send(path, OscType::Int(value));
    }

    fn send(&self, path: &str, arg: OscType) {
        if !self.has_clients() {
            return;
        }
        let Some(socket) = &self.socket else { return };

        let packet = OscPacket::Message(OscMessage {
            addr: path.to_string(),
            args: vec![arg],
        });
        let Ok(buffer) = encoder::encode(&packet) else {
            return;
        };

        let clients = self.clients.lock();
        for addr in clients.iter().flatten() {
            // Best-effort UDP: errors (including WouldBlock) are ignored.
            let _ = socket.send_to(&buffer, addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> OscRegistry {
        OscRegistry::new(&OscSettings {
            port: 1370,
            max_clients: 3,
        })
    }

    #[test]
    fn test_add_and_remove_clients() {
        let osc = registry();
        assert!(!osc.has_clients());

        assert_eq!(osc.add_client("127.0.0.1"), Some(0));
        assert!(osc.has_clients());
        assert_eq!(osc.add_client("10.0.0.1"), Some(1));

        // Duplicate registration reuses the existing slot.
        assert_eq!(osc.add_client("127.0.0.1"), Some(0));

        osc.remove_client("127.0.0.1");
        assert!(osc.has_clients());
        osc.remove_client("10.0.0.1");
        assert!(!osc.has_clients());
    }

    #[test]
    fn test_invalid_address_rejected() {
        let osc = registry();
        assert_eq!(osc.add_client("not-an-address"), None);
        assert!(!osc.has_clients());
    }

    #[test]
    fn test_registry_full() {
        let osc = registry();
        assert!(osc.add_client("10.0.0.1").is_some());
        assert!(osc.add_client("10.0.0.2").is_some());
        assert!(osc.add_client("10.0.0.3").is_some());
        assert_eq!(osc.add_client("10.0.0.4"), None);
    }

    #[test]
    fn test_send_without_clients_is_noop() {
        let osc = registry();
        // Nothing to assert beyond "does not panic or block".
        osc.send_float("/mixer/channel/0/fader", 0.8);
        osc.send_int("/mixer/channel/0/mute", 1);
    }

    #[test]
    fn test_send_with_local_client() {
        // A local listener proves the datagram actually goes out.
        let listener = UdpSocket::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        listener
            .set_read_timeout(Some(std::time::Duration::from_millis(500)))
            .unwrap();

        let osc = OscRegistry::new(&OscSettings {
            port,
            max_clients: 2,
        });
        osc.add_client("127.0.0.1");
        osc.send_float("/mixer/mixbus/0/fader", 0.5);

        let mut buf = [0u8; 256];
        let (len, _) = listener.recv_from(&mut buf).unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&buf[..len]).unwrap();
        match packet {
            OscPacket::Message(msg) => {
                assert_eq!(msg.addr, "/mixer/mixbus/0/fader");
                assert_eq!(msg.args.len(), 1);
                match &msg.args[0] {
                    OscType::Float(v) => assert!((v - 0.5).abs() < 1e-6),
                    other => panic!("unexpected arg {:?}", other),
                }
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }
}
