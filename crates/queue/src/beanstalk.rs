//! Minimal beanstalkd client covering exactly the commands the dispatcher
//! needs: `watch`, `reserve-with-timeout`, `bury`, `delete`, `put`, and
//! `stats-tube`. beanstalkd's wire protocol is line-oriented ASCII with an
//! occasional following byte-counted body (the job data, or a YAML stats
//! document) — see https://github.com/beanstalkd/beanstalkd/blob/master/doc/protocol.txt.

use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use teuthd_core::{JobDescriptor, MachineClass, QueueStats};

use crate::error::QueueError;
use crate::reporting::ReportingClient;
use crate::QueueBackend;

/// Key under which we stash beanstalkd's own numeric job id inside a
/// descriptor's opaque `extra` map, so `ack`/`fail` can address the same
/// job without widening the public `JobDescriptor` shape with a
/// beanstalk-specific field.
const BEANSTALK_ID_KEY: &str = "__beanstalk_job_id";

pub struct BeanstalkBackend {
    conn: Mutex<BufReader<TcpStream>>,
    reporting: ReportingClient,
}

impl BeanstalkBackend {
    /// Watches `machine_class`'s tube for `reserve`/`ack`/`fail`. `stats` and
    /// `pause` take their own machine class per call, so the watched tube
    /// only matters for reservation — see the exporter's single shared
    /// connection, which watches a tube it never reserves from.
    ///
    /// `report_base_url` has nothing to do with the tube: beanstalk carries
    /// job data, not status, so `fail`/`mark_running` still go over HTTP to
    /// the same reporting service the report-http backend talks to — see
    /// [`ReportingClient`].
    pub async fn connect(addr: &str, machine_class: MachineClass, report_base_url: &str) -> Result<Self, QueueError> {
        let stream = TcpStream::connect(addr).await?;
        let mut conn = BufReader::new(stream);
        watch_tube(&mut conn, machine_class.as_str()).await?;
        Ok(Self { conn: Mutex::new(conn), reporting: ReportingClient::new(report_base_url) })
    }

    async fn beanstalk_id(descriptor: &JobDescriptor) -> Result<u64, QueueError> {
        descriptor
            .extra
            .get(BEANSTALK_ID_KEY)
            .and_then(|v| v.as_u64())
            .ok_or(QueueError::MissingBeanstalkId)
    }
}

async fn write_line(conn: &mut BufReader<TcpStream>, line: &str) -> Result<(), QueueError> {
    conn.get_mut().write_all(line.as_bytes()).await?;
    conn.get_mut().write_all(b"\r\n").await?;
    Ok(())
}

async fn read_line(conn: &mut BufReader<TcpStream>) -> Result<String, QueueError> {
    let mut line = String::new();
    let n = conn.read_line(&mut line).await?;
    if n == 0 {
        return Err(QueueError::Protocol("connection closed".to_string()));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn read_body(conn: &mut BufReader<TcpStream>, len: usize) -> Result<Vec<u8>, QueueError> {
    let mut buf = vec![0u8; len + 2]; // trailing \r\n
    conn.read_exact(&mut buf).await?;
    buf.truncate(len);
    Ok(buf)
}

async fn watch_tube(conn: &mut BufReader<TcpStream>, tube: &str) -> Result<(), QueueError> {
    write_line(conn, &format!("watch {tube}")).await?;
    let reply = read_line(conn).await?;
    if !reply.starts_with("WATCHING") {
        return Err(QueueError::Protocol(format!("unexpected reply to watch: {reply}")));
    }
    Ok(())
}

#[async_trait::async_trait]
impl QueueBackend for BeanstalkBackend {
    async fn reserve(
        &self,
        timeout: Duration,
    ) -> Result<Option<JobDescriptor>, QueueError> {
        let mut conn = self.conn.lock().await;
        write_line(&mut conn, &format!("reserve-with-timeout {}", timeout.as_secs())).await?;
        let reply = read_line(&mut conn).await?;

        if reply == "TIMED_OUT" || reply == "DEADLINE_SOON" {
            return Ok(None);
        }

        let mut parts = reply.split_whitespace();
        match parts.next() {
            Some("RESERVED") => {}
            _ => return Err(QueueError::Protocol(format!("unexpected reserve reply: {reply}"))),
        }
        let beanstalk_id: u64 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| QueueError::Protocol(format!("bad reserve reply: {reply}")))?;
        let len: usize = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| QueueError::Protocol(format!("bad reserve reply: {reply}")))?;

        let body = read_body(&mut conn, len).await?;

        // Crash-safety: bury immediately so a dispatcher death between here
        // and `ack` leaves the job retrievable (if stuck) rather than
        // silently redelivered to another dispatcher mid-flight.
        write_line(&mut conn, &format!("bury {beanstalk_id}")).await?;
        let bury_reply = read_line(&mut conn).await?;
        if bury_reply != "BURIED" {
            return Err(QueueError::Protocol(format!(
                "unexpected reply to bury {beanstalk_id}: {bury_reply}"
            )));
        }

        let mut descriptor: JobDescriptor = serde_yaml::from_slice(&body)?;
        descriptor
            .extra
            .insert(BEANSTALK_ID_KEY.to_string(), serde_json::Value::from(beanstalk_id));
        Ok(Some(descriptor))
    }

    async fn ack(&self, descriptor: &JobDescriptor) -> Result<(), QueueError> {
        let id = Self::beanstalk_id(descriptor).await?;
        let mut conn = self.conn.lock().await;
        write_line(&mut conn, &format!("delete {id}")).await?;
        let reply = read_line(&mut conn).await?;
        if reply != "DELETED" {
            return Err(QueueError::Protocol(format!("unexpected reply to delete {id}: {reply}")));
        }
        Ok(())
    }

    async fn fail(&self, descriptor: &JobDescriptor, reason: &str) -> Result<(), QueueError> {
        // Burying already happened at reserve time; this is in addition to
        // (not a replacement of) that — the reporting service still needs
        // to hear about it independent of the tube state.
        let machine_class = descriptor.machine_type.clone().unwrap_or_else(|| MachineClass::from("unknown"));
        self.reporting.fail(descriptor.job_id.as_str(), reason, &machine_class).await
    }

    async fn mark_running(&self, descriptor: &JobDescriptor) -> Result<(), QueueError> {
        let machine_class = descriptor.machine_type.clone().unwrap_or_else(|| MachineClass::from("unknown"));
        self.reporting.mark_running(descriptor.job_id.as_str(), &machine_class).await
    }

    async fn stats(&self, machine_class: &MachineClass) -> Result<QueueStats, QueueError> {
        let mut conn = self.conn.lock().await;
        write_line(&mut conn, &format!("stats-tube {}", machine_class.as_str())).await?;
        let reply = read_line(&mut conn).await?;
        let len: usize = match reply.split_whitespace().collect::<Vec<_>>().as_slice() {
            ["OK", n] => n.parse().map_err(|_| QueueError::Protocol(reply.clone()))?,
            ["NOT_FOUND"] => return Ok(QueueStats { count: 0, paused: false }),
            _ => return Err(QueueError::Protocol(format!("unexpected stats-tube reply: {reply}"))),
        };
        let body = read_body(&mut conn, len).await?;
        let stats: BeanstalkTubeStats = serde_yaml::from_slice(&body)?;
        Ok(QueueStats {
            count: stats.current_jobs_ready + stats.current_jobs_reserved,
            paused: stats.pause > 0,
        })
    }

    async fn pause(&self, machine_class: &MachineClass, paused: bool, _by: &str) -> Result<(), QueueError> {
        // beanstalkd has no "pause indefinitely" delay; the facade owns the
        // duration-then-clear contract (see QueueClient::pause), so here we
        // only need "on" (a long delay) or "off" (delay 0, which beanstalkd
        // defines as an immediate un-pause).
        const INDEFINITE_SECS: u64 = 60 * 60 * 24 * 365 * 50;
        let mut conn = self.conn.lock().await;
        let delay = if paused { INDEFINITE_SECS } else { 0 };
        write_line(&mut conn, &format!("pause-tube {} {delay}", machine_class.as_str())).await?;
        let reply = read_line(&mut conn).await?;
        if reply != "PAUSED" {
            return Err(QueueError::Protocol(format!("unexpected reply to pause-tube: {reply}")));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct BeanstalkTubeStats {
    #[serde(rename = "current-jobs-ready", default)]
    current_jobs_ready: u64,
    #[serde(rename = "current-jobs-reserved", default)]
    current_jobs_reserved: u64,
    #[serde(default)]
    pause: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn status_line_with_body(status: &str, body: &[u8]) -> Vec<u8> {
        let mut out = format!("{status} {}\r\n", body.len()).into_bytes();
        out.extend_from_slice(body);
        out.extend_from_slice(b"\r\n");
        out
    }

    /// Spawns a one-shot fake beanstalkd that replies `WATCHING <tube>` to
    /// the initial watch, then plays back `scripted` lines/bodies for every
    /// line it reads afterward, in order.
    async fn fake_beanstalkd(scripted: Vec<Vec<u8>>) -> (BeanstalkBackend, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = sock.split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            write_half.write_all(b"WATCHING smithi\r\n").await.unwrap();

            for chunk in scripted {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                write_half.write_all(&chunk).await.unwrap();
            }
        });

        let backend = BeanstalkBackend::connect(&addr.to_string(), MachineClass::from("smithi"), "http://127.0.0.1:1")
            .await
            .unwrap();
        (backend, server)
    }

    #[tokio::test]
    async fn reserve_buries_and_tags_the_beanstalk_job_id() {
        let body = b"job_id: '9'\nname: run-a\n";
        let (backend, server) =
            fake_beanstalkd(vec![status_line_with_body("RESERVED 42", body), b"BURIED\r\n".to_vec()]).await;

        let descriptor = backend.reserve(Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(descriptor.name, "run-a");
        assert_eq!(
            descriptor.extra.get(BEANSTALK_ID_KEY).and_then(|v| v.as_u64()),
            Some(42)
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn reserve_returns_none_on_timeout() {
        let (backend, server) = fake_beanstalkd(vec![b"TIMED_OUT\r\n".to_vec()]).await;
        let outcome = backend.reserve(Duration::from_secs(60)).await.unwrap();
        assert!(outcome.is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn fail_and_mark_running_go_to_the_reporting_service_not_the_tube() {
        // No scripted tube replies: a correct fail/mark_running never talks
        // to the beanstalk connection at all, only the reporting service
        // (unreachable here), so the fake server closes right after the
        // initial watch and is never touched again.
        let (backend, server) = fake_beanstalkd(vec![]).await;
        let descriptor = JobDescriptor {
            job_id: "9".into(),
            name: "run".to_string(),
            machine_type: Some(MachineClass::from("smithi")),
            roles: Vec::new(),
            stop_worker: false,
            status: None,
            targets: Default::default(),
            extra: Default::default(),
        };

        let fail_err = backend.fail(&descriptor, "boom").await.unwrap_err();
        assert!(matches!(fail_err, QueueError::Http(_)));
        let running_err = backend.mark_running(&descriptor).await.unwrap_err();
        assert!(matches!(running_err, QueueError::Http(_)));

        drop(backend);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn stats_parses_ready_and_reserved_counts() {
        let body = b"current-jobs-ready: 3\ncurrent-jobs-reserved: 1\npause: 0\n";
        let (backend, server) = fake_beanstalkd(vec![status_line_with_body("OK", body)]).await;

        let stats = backend.stats(&MachineClass::from("smithi")).await.unwrap();
        assert_eq!(stats.count, 4);
        assert!(!stats.paused);
        server.await.unwrap();
    }
}
