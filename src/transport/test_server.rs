//! Minimal HTTP/1.1 server recording the requests it receives

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One received request, with the body split as it arrived on the wire
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    /// Each element is one transfer chunk (or the whole sized body)
    pub chunks: Vec<Vec<u8>>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> Vec<u8> {
        self.chunks.concat()
    }
}

/// Serves one connection per scripted response, then stops
pub struct TestServer {
    addr: std::net::SocketAddr,
    task: JoinHandle<Vec<RecordedRequest>>,
}

impl TestServer {
    /// `responses` are `(status, body)` pairs answered in order
    pub async fn start(responses: Vec<(u16, Vec<u8>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let task = tokio::spawn(async move {
            let mut recorded = Vec::new();
            for (status, body) in responses {
                let (socket, _) = listener.accept().await.unwrap();
                let (read_half, mut write_half) = socket.into_split();
                let mut reader = BufReader::new(read_half);

                recorded.push(read_request(&mut reader).await);

                let head = format!(
                    "HTTP/1.1 {} Test\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                write_half.write_all(head.as_bytes()).await.unwrap();
                write_half.write_all(&body).await.unwrap();
                write_half.shutdown().await.unwrap();
            }
            recorded
        });

        Self { addr, task }
    }

    /// Reads one full request and never answers it
    pub async fn silent() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let task = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(socket);
            let request = read_request(&mut reader).await;

            // Hold the connection open until the client goes away
            let mut rest = Vec::new();
            let _ = tokio::time::timeout(
                std::time::Duration::from_secs(5),
                reader.read_to_end(&mut rest),
            )
            .await;
            vec![request]
        });

        Self { addr, task }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Wait for every scripted exchange and return what was received
    pub async fn finish(self) -> Vec<RecordedRequest> {
        tokio::time::timeout(std::time::Duration::from_secs(10), self.task)
            .await
            .expect("test server timed out")
            .unwrap()
    }
}

async fn read_line<R: AsyncBufReadExt + Unpin>(reader: &mut R) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    line.trim_end_matches(['\r', '\n']).to_string()
}

async fn read_request<R: AsyncBufReadExt + Unpin>(reader: &mut R) -> RecordedRequest {
    let request_line = read_line(reader).await;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    loop {
        let line = read_line(reader).await;
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }

    let mut request = RecordedRequest {
        method,
        path,
        headers,
        chunks: Vec::new(),
    };

    if request
        .header("transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
    {
        loop {
            let size_line = read_line(reader).await;
            let size = usize::from_str_radix(size_line.split(';').next().unwrap_or("0").trim(), 16)
                .unwrap();
            if size == 0 {
                // Trailers end with an empty line
                while !read_line(reader).await.is_empty() {}
                break;
            }
            let mut chunk = vec![0u8; size];
            reader.read_exact(&mut chunk).await.unwrap();
            read_line(reader).await;
            request.chunks.push(chunk);
        }
    } else if let Some(length) = request.header("content-length").and_then(|v| v.parse::<usize>().ok()) {
        if length > 0 {
            let mut body = vec![0u8; length];
            reader.read_exact(&mut body).await.unwrap();
            request.chunks.push(body);
        }
    }

    request
}
