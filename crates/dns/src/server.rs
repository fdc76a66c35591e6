use crate::{
    encode_response_with_address, Header, Result, DEFAULT_ANSWER_ADDRESS, MAX_DATAGRAM_SIZE,
};
use bytes::BytesMut;
use std::net::{Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;
use tracing::Instrument;

/// Answers every DNS datagram received on its socket. Each datagram is handled
/// by its own task.
///
/// By default the number of request tasks is unbounded, so a flood of queries
/// spawns tasks as fast as they arrive. Use [`Server::with_max_in_flight`] to
/// cap it.
#[derive(Clone)]
pub struct Server {
    udp_socket: Arc<UdpSocket>,
    in_flight: Option<Arc<Semaphore>>,
}

pub trait Handler {
    fn handle_dns_query(
        &self,
        header: Header,
        message: &[u8],
    ) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
}

/// Answers every question with an A record for the same address.
#[derive(Clone, Copy, Debug)]
pub struct CannedAnswer {
    pub address: Ipv4Addr,
}

impl Default for CannedAnswer {
    fn default() -> Self {
        Self {
            address: DEFAULT_ANSWER_ADDRESS,
        }
    }
}

impl Handler for CannedAnswer {
    async fn handle_dns_query(
        &self,
        header: Header,
        message: &[u8],
    ) -> Result<Vec<u8>> {
        encode_response_with_address(header, message, self.address)
    }
}

impl Server {
    pub async fn bind(listen_address: SocketAddr) -> Result<Self> {
        Ok(Self {
            udp_socket: Arc::new(UdpSocket::bind(listen_address).await?),
            in_flight: None,
        })
    }

    /// Stops receiving while `limit` requests are being handled.
    pub fn with_max_in_flight(
        mut self,
        limit: NonZeroUsize,
    ) -> Self {
        self.in_flight = Some(Arc::new(Semaphore::new(limit.get())));
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.udp_socket.local_addr()?)
    }

    pub async fn listen<T>(
        &self,
        handler: T,
    ) -> Result<()>
    where
        T: Handler + Clone + Send + Sync + 'static,
    {
        loop {
            let permit = match &self.in_flight {
                Some(in_flight) => match in_flight.clone().acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return Ok(()),
                },
                None => None,
            };
            let mut buffer = BytesMut::zeroed(MAX_DATAGRAM_SIZE);
            let (size, address) = match self.udp_socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(error) => {
                    tracing::error!("Failed to receive DNS datagram: {error}");
                    continue;
                }
            };
            buffer.truncate(size);
            let message = buffer.freeze();
            let udp_socket = self.udp_socket.clone();
            let handler = handler.clone();
            let span = tracing::debug_span!(
                "dns",
                %address,
                id = tracing::field::Empty,
                opcode = tracing::field::Empty,
            );
            tokio::spawn(
                async move {
                    let _permit = permit;
                    if let Err(error) =
                        handle_datagram(&udp_socket, &handler, &message, address).await
                    {
                        tracing::error!("Dropping DNS query from {address}: {error}");
                    }
                }
                .instrument(span),
            );
        }
    }
}

async fn handle_datagram<T>(
    udp_socket: &UdpSocket,
    handler: &T,
    message: &[u8],
    address: SocketAddr,
) -> Result<()>
where
    T: Handler,
{
    let header = Header::decode(message)?;
    tracing::Span::current()
        .record("id", header.id)
        .record("opcode", header.flags.opcode());
    tracing::debug!(
        "DNS/UDP: {} question(s), opcode {}, rcode {}",
        header.question_count,
        header.flags.opcode(),
        header.flags.response_code(),
    );
    let response = handler.handle_dns_query(header, message).await?;
    udp_socket.send_to(&response, address).await?;
    tracing::debug!("Answered DNS query {} with {} bytes", header.id, response.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Flags, HEADER_LENGTH};
    use std::time::Duration;

    fn query(id: u16) -> Vec<u8> {
        let mut packet = id.to_be_bytes().to_vec();
        packet.extend_from_slice(&[
            0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x07, b'e', b'x', b'a',
            b'm', b'p', b'l', b'e', 0x03, b'c', b'o', b'm', 0x00, 0x00, 0x01, 0x00, 0x01,
        ]);
        packet
    }

    async fn spawn_server(server: Server) -> SocketAddr {
        let address = server.local_addr().unwrap();
        tokio::spawn(async move { server.listen(CannedAnswer::default()).await });
        address
    }

    async fn client() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    async fn receive(socket: &UdpSocket) -> Vec<u8> {
        let mut buffer = [0; MAX_DATAGRAM_SIZE];
        let size = tokio::time::timeout(Duration::from_secs(5), socket.recv(&mut buffer))
            .await
            .unwrap()
            .unwrap();
        buffer[..size].to_vec()
    }

    #[tokio::test]
    async fn test_answers_query() {
        let server = Server::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let address = spawn_server(server).await;
        let socket = client().await;
        let request = query(0xbeef);
        socket.send_to(&request, address).await.unwrap();

        let response = receive(&socket).await;
        let header = Header::decode(&response).unwrap();
        assert_eq!(header.id, 0xbeef);
        assert_eq!(header.flags, Flags::STANDARD_RESPONSE);
        assert_eq!(header.answer_count, 1);
        assert_eq!(
            &response[HEADER_LENGTH..request.len()],
            &request[HEADER_LENGTH..]
        );
        assert_eq!(&response[response.len() - 4..], &[192, 0, 2, 1]);
    }

    #[tokio::test]
    async fn test_concurrent_queries_keep_their_ids() {
        let server = Server::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let address = spawn_server(server).await;
        let first = client().await;
        let second = client().await;
        let (first_query, second_query) = (query(1), query(2));
        let (a, b) = tokio::join!(
            first.send_to(&first_query, address),
            second.send_to(&second_query, address),
        );
        a.unwrap();
        b.unwrap();

        let (first, second) = tokio::join!(receive(&first), receive(&second));
        assert_eq!(Header::decode(&first).unwrap().id, 1);
        assert_eq!(Header::decode(&second).unwrap().id, 2);
    }

    #[tokio::test]
    async fn test_answers_query_with_nonstandard_opcode() {
        let server = Server::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let address = spawn_server(server).await;
        let socket = client().await;
        let mut request = query(0x0505);
        // opcode 5 (UPDATE), rcode 3
        request[2..4].copy_from_slice(&[0x29, 0x03]);
        socket.send_to(&request, address).await.unwrap();

        let response = receive(&socket).await;
        let header = Header::decode(&response).unwrap();
        assert_eq!(header.id, 0x0505);
        assert_eq!(header.flags, Flags::STANDARD_RESPONSE);
        assert_eq!(header.flags.opcode(), 0);
        assert_eq!(header.flags.response_code(), 0);
    }

    #[tokio::test]
    async fn test_malformed_query_is_dropped() {
        let server = Server::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let address = spawn_server(server).await;
        let socket = client().await;

        socket.send_to(&[0x00, 0x01, 0x01], address).await.unwrap();
        let mut truncated = query(3);
        truncated.truncate(20);
        socket.send_to(&truncated, address).await.unwrap();
        socket.send_to(&query(4), address).await.unwrap();

        let response = receive(&socket).await;
        assert_eq!(Header::decode(&response).unwrap().id, 4);
    }

    #[tokio::test]
    async fn test_bounded_server_answers_every_query() {
        let server = Server::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap()
            .with_max_in_flight(NonZeroUsize::MIN);
        let address = spawn_server(server).await;
        let socket = client().await;
        for id in 10..15 {
            socket.send_to(&query(id), address).await.unwrap();
        }
        let mut ids = Vec::new();
        for _ in 10..15 {
            let response = receive(&socket).await;
            ids.push(Header::decode(&response).unwrap().id);
        }
        ids.sort();
        assert_eq!(ids, [10, 11, 12, 13, 14]);
    }
}
