//! Session with one terminal
//!
//! Owns the link, the session/reply ids and the record width in use, and
//! provides `send_command`, the single request/response primitive every
//! other operation is built from.

use bytes::Bytes;
use tracing::{debug, info, warn};
use zklink_core::{
    constants::{DEFAULT_TICKS, INITIAL_REPLY_ID},
    packet::encode_header,
    Command, PacketHeader, SessionIds, SessionState,
};
use zklink_transport::{HostProbe, SystemProbe, TcpTransport, Transport, UdpTransport};

use crate::{
    config::DeviceConfig,
    error::{Error, Result},
    link::{Framing, Link, Received},
};

/// Outcome of one `send_command` round trip
#[derive(Debug, Clone)]
pub struct CommandResponse {
    /// Code is ACK_OK, PREPARE_DATA or DATA
    pub status: bool,

    /// Response code from the reply header
    pub code: u16,

    pub header: PacketHeader,

    /// Every byte read after the header
    pub payload: Bytes,

    /// Declared frame length (TCP only)
    pub tcp_length: Option<usize>,
}

impl CommandResponse {
    fn new(received: Received) -> Self {
        let code = received.header.command;
        Self {
            status: Command::is_success_code(code),
            code,
            header: received.header,
            payload: received.payload,
            tcp_length: received.tcp_length,
        }
    }

    /// Known response command, if any
    pub fn command(&self) -> Option<Command> {
        self.header.command()
    }

    /// Turn a failure status into `Error::Protocol`
    pub fn ensure(self, operation: &'static str) -> Result<Self> {
        if self.status {
            Ok(self)
        } else {
            Err(Error::protocol(operation, self.code))
        }
    }
}

/// Value of an option reply: text after the first `=`, up to the first NUL
pub fn option_value(payload: &[u8]) -> Bytes {
    let value = match payload.iter().position(|&b| b == b'=') {
        Some(eq) => &payload[eq + 1..],
        None => payload,
    };
    let end = value.iter().position(|&b| b == 0).unwrap_or(value.len());
    Bytes::copy_from_slice(&value[..end])
}

/// Request payload of an option query: the key, NUL-terminated
pub fn option_request(key: &str) -> Vec<u8> {
    let mut request = Vec::with_capacity(key.len() + 1);
    request.extend_from_slice(key.as_bytes());
    request.push(0);
    request
}

/// Protocol session with one terminal
pub struct Session {
    config: DeviceConfig,
    probe: Box<dyn HostProbe>,
    link: Option<Link>,
    ids: SessionIds,
    user_packet_size: usize,
}

impl Session {
    /// Create a disconnected session
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            probe: Box::new(SystemProbe::new()),
            link: None,
            ids: SessionIds::new(),
            user_packet_size: Framing::Udp.user_packet_size(),
        }
    }

    /// Use another reachability probe
    pub fn with_probe(mut self, probe: impl HostProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some() && self.ids.is_connected()
    }

    pub fn state(&self) -> SessionState {
        self.ids.state()
    }

    pub fn session_id(&self) -> u16 {
        self.ids.session_id()
    }

    pub fn reply_id(&self) -> u16 {
        self.ids.reply_id()
    }

    /// Framing of the open link
    pub fn framing(&self) -> Option<Framing> {
        self.link.as_ref().map(Link::framing)
    }

    /// User record width currently assumed (28 or 72)
    pub fn user_packet_size(&self) -> usize {
        self.user_packet_size
    }

    pub(crate) fn set_user_packet_size(&mut self, size: usize) {
        self.user_packet_size = size;
    }

    /// Connect to the device
    ///
    /// Pings the host unless told not to, then prefers TCP when the port
    /// accepts connections, falling back to UDP.
    ///
    /// # Errors
    ///
    /// - Network errors when the host is unreachable or the link fails
    /// - `Error::Authentication` when the device rejects the CommKey
    /// - `Error::Connect` for any other refusal
    pub async fn connect(&mut self) -> Result<()> {
        let host = self.config.host().to_string();
        let port = self.config.port();

        if !self.config.omit_ping() && !self.probe.ping(&host).await {
            return Err(Error::Network(format!("can't reach device (ping {})", host)));
        }

        let framing = if !self.config.force_udp() && self.probe.tcp_open(&host, port).await {
            Framing::Tcp
        } else {
            Framing::Udp
        };

        let timeout = self.config.timeout();
        let io: Box<dyn Transport> = match framing {
            Framing::Tcp => Box::new(
                TcpTransport::new(host, port)
                    .with_connect_timeout(timeout)
                    .with_read_timeout(timeout),
            ),
            Framing::Udp => Box::new(UdpTransport::new(host, port).with_read_timeout(timeout)),
        };

        self.connect_with(framing, io).await
    }

    /// Run the handshake over a caller-supplied transport
    pub async fn connect_with(&mut self, framing: Framing, io: Box<dyn Transport>) -> Result<()> {
        if self.link.is_some() {
            self.teardown().await;
        }

        let mut link = Link::new(framing, io);
        info!("Connecting to {} via {}...", link.remote_addr(), framing);
        link.open().await?;

        self.link = Some(link);
        self.user_packet_size = framing.user_packet_size();

        if let Err(e) = self.handshake().await {
            self.teardown().await;
            return Err(e);
        }

        info!(
            "Connected (session_id={}, user_packet_size={})",
            self.ids.session_id(),
            self.user_packet_size
        );
        Ok(())
    }

    async fn handshake(&mut self) -> Result<()> {
        self.ids.close();
        self.ids.begin()?;

        let mut response = self.send_command(Command::Connect, &[], 8).await?;
        self.ids.assign(response.header.session_id);

        if response.code == u16::from(Command::AckUnauth) {
            debug!("Device requires authentication, sending CommKey...");
            self.ids.challenge()?;

            let key = zklink_core::derive_key(
                self.config.password(),
                u32::from(self.ids.session_id()),
                DEFAULT_TICKS,
            );
            response = self.send_command(Command::Auth, &key, 8).await?;

            if response.status {
                self.ids.authenticate()?;
            }
        }

        if response.status {
            self.ids.establish()?;
            return Ok(());
        }

        if response.code == u16::from(Command::AckUnauth) {
            return Err(Error::Authentication("Unauthenticated".into()));
        }

        warn!("Connect refused with {}", Command::describe(response.code));
        Err(Error::Connect {
            code: response.code,
        })
    }

    /// Say goodbye and close the socket
    pub async fn disconnect(&mut self) -> Result<()> {
        let response = self.send_command(Command::Exit, &[], 8).await?;
        if !response.status {
            return Err(Error::protocol("can't disconnect", response.code));
        }

        self.teardown().await;
        info!("Disconnected");
        Ok(())
    }

    /// Drop the link after a fatal error or on disconnect
    pub(crate) async fn teardown(&mut self) {
        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.close().await {
                debug!("Error while closing link: {}", e);
            }
        }
        self.ids.close();
    }

    /// Close the link if `result` is a network failure
    pub(crate) async fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_network() {
                warn!("Network failure, dropping link: {}", e);
                self.teardown().await;
            }
        }
        result
    }

    pub(crate) fn link_mut(&mut self) -> Result<&mut Link> {
        self.link.as_mut().ok_or(Error::NotConnected)
    }

    /// Send one command and read its reply
    ///
    /// `response_size` bounds the reply read: on TCP `response_size + 8`
    /// bytes are read so the frame prefix fits as well.
    pub async fn send_command(
        &mut self,
        command: Command,
        payload: &[u8],
        response_size: usize,
    ) -> Result<CommandResponse> {
        self.link_mut()?;
        let reply_id = self.ids.advance();
        let (packet, _) = encode_header(command.into(), payload, self.ids.session_id(), reply_id);

        let result = self.exchange(&packet, response_size).await;
        let received = self.guard(result).await?;

        self.ids.adopt(&received.header);

        let response = CommandResponse::new(received);
        debug!(
            command = %command,
            response = %Command::describe(response.code),
            payload_len = response.payload.len(),
            "Command round trip"
        );

        Ok(response)
    }

    async fn exchange(&mut self, packet: &[u8], response_size: usize) -> Result<Received> {
        let link = self.link_mut()?;
        link.send_framed(packet).await?;
        link.recv_framed(response_size).await
    }

    /// Acknowledge an event; nothing is read back
    pub async fn ack_ok(&mut self) -> Result<()> {
        let (packet, _) = encode_header(
            Command::AckOk.into(),
            &[],
            self.ids.session_id(),
            INITIAL_REPLY_ID,
        );

        let result = match self.link_mut() {
            Ok(link) => link.send_framed(&packet).await,
            Err(e) => Err(e),
        };
        self.guard(result).await
    }

    /// Read exactly `size` further bytes from the link
    pub async fn receive_raw(&mut self, size: usize) -> Result<Bytes> {
        let result = match self.link_mut() {
            Ok(link) => link.recv_exact(size).await,
            Err(e) => Err(e),
        };
        Ok(self.guard(result).await?.freeze())
    }

    /// Query a device option by key
    ///
    /// Returns `None` when the device answers with a failure code.
    pub async fn get_option(&mut self, key: &str) -> Result<Option<Bytes>> {
        let response = self.query_option(key).await?;
        if !response.status {
            debug!("Option {} not available ({})", key, Command::describe(response.code));
            return Ok(None);
        }
        Ok(Some(option_value(&response.payload)))
    }

    /// Raw option round trip
    pub async fn query_option(&mut self, key: &str) -> Result<CommandResponse> {
        self.send_command(Command::OptionsRrq, &option_request(key), 1024)
            .await
    }

    /// Release the device-side transfer buffer
    pub async fn free_data(&mut self) -> Result<()> {
        self.send_command(Command::FreeData, &[], 8)
            .await?
            .ensure("can't free data")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDevice;
    use async_trait::async_trait;
    use mockall::mock;
    use pretty_assertions::assert_eq;
    use zklink_core::packet::{next_reply_id, seal, wrap_tcp};

    mock! {
        pub Probe {}

        #[async_trait]
        impl HostProbe for Probe {
            async fn ping(&self, host: &str) -> bool;
            async fn tcp_open(&self, host: &str, port: u16) -> bool;
        }
    }

    fn config() -> DeviceConfig {
        DeviceConfig::new("127.0.0.1").with_omit_ping(true)
    }

    #[test]
    fn test_option_value() {
        assert_eq!(&option_value(b"~Platform=ZMM220_TFT\0\0\0")[..], b"ZMM220_TFT");
        assert_eq!(&option_value(b"IPAddress=10.0.0.2")[..], b"10.0.0.2");
        assert_eq!(&option_value(b"a=b=c\0")[..], b"b=c");
        assert_eq!(&option_value(b"plain\0rest")[..], b"plain");
        assert_eq!(&option_request("MAC")[..], b"MAC\0");
    }

    #[tokio::test]
    async fn test_connect_without_auth() {
        let device = FakeDevice::new(Framing::Tcp).with_session_id(0x1234);
        let log = device.log();

        let mut session = Session::new(config());
        session.connect_with(Framing::Tcp, Box::new(device)).await.unwrap();

        assert!(session.is_connected());
        assert_eq!(session.session_id(), 0x1234);
        assert_eq!(session.user_packet_size(), 72);
        assert_eq!(session.framing(), Some(Framing::Tcp));

        let connect = &log.all()[0];
        assert_eq!(connect.command, 1000);
        // Fresh session: ids reset, wire carries the advanced reply id
        assert_eq!(connect.session_id, 0);
        assert_eq!(connect.reply_id, 0);
    }

    #[tokio::test]
    async fn test_connect_with_auth() {
        let device = FakeDevice::new(Framing::Udp)
            .with_session_id(77)
            .with_password(123456);
        let log = device.log();

        let mut session = Session::new(config().with_password(123456));
        session.connect_with(Framing::Udp, Box::new(device)).await.unwrap();

        assert!(session.is_connected());
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.user_packet_size(), 28);

        let auth = &log.of(Command::Auth)[0];
        assert_eq!(auth.session_id, 77);
        assert_eq!(auth.payload, zklink_core::derive_key(123456, 77, 50).to_vec());
    }

    #[tokio::test]
    async fn test_rejected_key() {
        let device = FakeDevice::new(Framing::Tcp).with_password(1);

        let mut session = Session::new(config().with_password(2));
        let err = session
            .connect_with(Framing::Tcp, Box::new(device))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Authentication(_)));
        assert!(!session.is_connected());
        assert_eq!(session.framing(), None);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let device = FakeDevice::new(Framing::Udp).failing(Command::Connect);

        let mut session = Session::new(config());
        let err = session
            .connect_with(Framing::Udp, Box::new(device))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Connect { code: 2001 }));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_silent_device_is_network_error() {
        let device = FakeDevice::new(Framing::Udp).silent();

        let mut session = Session::new(config());
        let err = session
            .connect_with(Framing::Udp, Box::new(device))
            .await
            .unwrap_err();

        assert!(err.is_network());
        assert_eq!(session.framing(), None);
    }

    #[tokio::test]
    async fn test_disconnect() {
        let mut session = Session::new(config());
        session
            .connect_with(Framing::Tcp, Box::new(FakeDevice::new(Framing::Tcp)))
            .await
            .unwrap();

        session.disconnect().await.unwrap();

        assert!(!session.is_connected());
        assert!(matches!(
            session.send_command(Command::EnableDevice, &[], 8).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_refused() {
        let device = FakeDevice::new(Framing::Udp).failing(Command::Exit);

        let mut session = Session::new(config());
        session.connect_with(Framing::Udp, Box::new(device)).await.unwrap();

        let err = session.disconnect().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol {
                operation: "can't disconnect",
                code: 2001
            }
        ));
    }

    #[tokio::test]
    async fn test_reply_ids_advance_and_wrap() {
        let device = FakeDevice::new(Framing::Tcp);
        let log = device.log();

        let mut session = Session::new(config());
        session.connect_with(Framing::Tcp, Box::new(device)).await.unwrap();

        for _ in 0..10 {
            session.send_command(Command::EnableDevice, &[], 8).await.unwrap();
        }

        let wire: Vec<u16> = log.all().iter().map(|r| r.reply_id).collect();
        assert_eq!(wire.len(), 11);
        for pair in wire.windows(2) {
            assert_eq!(pair[1], next_reply_id(pair[0]));
        }
        assert_eq!(session.reply_id(), 10);
    }

    #[tokio::test]
    async fn test_reply_id_wraps_past_ffff() {
        let device = FakeDevice::new(Framing::Udp).with_connect_reply_id(0xFFF0);
        let log = device.log();

        let mut session = Session::new(config());
        session.connect_with(Framing::Udp, Box::new(device)).await.unwrap();

        for _ in 0..20 {
            session.send_command(Command::EnableDevice, &[], 8).await.unwrap();
        }

        // Session adopts the id echoed on connect and wraps past 0xFFFE
        let wire: Vec<u16> = log.all().iter().skip(1).map(|r| r.reply_id).collect();
        assert!(wire.contains(&0xFFFE));
        assert!(wire.contains(&0));
        assert!(!wire.contains(&0xFFFF));
        for pair in wire.windows(2) {
            assert_eq!(pair[1], next_reply_id(pair[0]));
        }
    }

    #[tokio::test]
    async fn test_ack_ok_uses_fixed_reply_id() {
        let device = FakeDevice::new(Framing::Udp);
        let log = device.log();

        let mut session = Session::new(config());
        session.connect_with(Framing::Udp, Box::new(device)).await.unwrap();
        session.send_command(Command::EnableDevice, &[], 8).await.unwrap();

        session.ack_ok().await.unwrap();

        let ack = log.all().pop().unwrap();
        assert_eq!(ack.command, 2000);
        assert_eq!(ack.reply_id, 0);
    }

    #[tokio::test]
    async fn test_get_option() {
        let device = FakeDevice::new(Framing::Tcp).with_option("~Platform", "ZMM220_TFT");

        let mut session = Session::new(config());
        session.connect_with(Framing::Tcp, Box::new(device)).await.unwrap();

        let value = session.get_option("~Platform").await.unwrap();
        assert_eq!(value.as_deref(), Some(&b"ZMM220_TFT"[..]));

        assert_eq!(session.get_option("Missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_free_data_refused() {
        let device = FakeDevice::new(Framing::Udp).failing(Command::FreeData);

        let mut session = Session::new(config());
        session.connect_with(Framing::Udp, Box::new(device)).await.unwrap();

        assert!(matches!(
            session.free_data().await,
            Err(Error::Protocol {
                operation: "can't free data",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let mut probe = MockProbe::new();
        probe.expect_ping().times(1).return_const(false);
        probe.expect_tcp_open().never();

        let mut session = Session::new(DeviceConfig::new("10.255.255.1")).with_probe(probe);
        let err = session.connect().await.unwrap_err();

        assert!(err.is_network());
        assert!(err.to_string().contains("can't reach device"));
    }

    #[tokio::test]
    async fn test_force_udp_skips_tcp_probe() {
        let device = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = device.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (n, peer) = device.recv_from(&mut buf).await.unwrap();
            let request = PacketHeader::decode(&buf[..n]).unwrap();
            let reply = seal(Command::AckOk.into(), &[], 42, request.reply_id);
            device.send_to(&reply, peer).await.unwrap();
            request
        });

        let mut probe = MockProbe::new();
        probe.expect_ping().return_const(true);
        probe.expect_tcp_open().never();

        let mut session = Session::new(
            DeviceConfig::new("127.0.0.1")
                .with_port(port)
                .with_force_udp(true),
        )
        .with_probe(probe);
        session.connect().await.unwrap();

        assert_eq!(server.await.unwrap().command, 1000);
        assert_eq!(session.framing(), Some(Framing::Udp));
        assert_eq!(session.user_packet_size(), 28);
        assert_eq!(session.session_id(), 42);
    }

    #[tokio::test]
    async fn test_tcp_chosen_when_port_open() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            socket.read_exact(&mut buf).await.unwrap();
            let request = PacketHeader::decode(&buf[8..]).unwrap();
            let reply = wrap_tcp(&seal(Command::AckOk.into(), &[], 9, request.reply_id));
            socket.write_all(&reply).await.unwrap();
            // Keep the socket open until the client is done
            let _ = socket.read(&mut buf).await;
        });

        let mut probe = MockProbe::new();
        probe.expect_ping().never();
        probe
            .expect_tcp_open()
            .withf(move |_, p| *p == port)
            .return_const(true);

        let mut session = Session::new(config().with_port(port)).with_probe(probe);
        session.connect().await.unwrap();

        assert_eq!(session.framing(), Some(Framing::Tcp));
        assert_eq!(session.user_packet_size(), 72);
        assert_eq!(session.session_id(), 9);

        session.teardown().await;
        server.await.unwrap();
    }
}
