//! End-to-end delivery against scripted in-memory exchangers.

#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, DuplexStream};

use mxsend_smtp::command::Command;
use mxsend_smtp::lexer::TokenMatcher;
use mxsend_smtp::parser::GrammarParser;
use mxsend_smtp::{
    Config, DeliveryError, Dispatcher, ExchangeCandidate, ExchangerLookup, LookupError, Transport,
};

/// How a scripted exchanger answers.
#[derive(Debug, Clone, Copy)]
enum Script {
    Accept,
    RejectMail(u16),
    RejectRcpt(u16),
    /// Accepts the connection but never sends a greeting.
    Silent,
}

/// Message as seen by a scripted exchanger.
#[derive(Debug, Clone)]
struct Received {
    host: String,
    commands: Vec<String>,
    data: Vec<String>,
}

#[derive(Clone, Default)]
struct Exchangers {
    scripts: HashMap<String, Script>,
    opened: Arc<Mutex<Vec<String>>>,
    received: Arc<Mutex<Vec<Received>>>,
}

impl Exchangers {
    fn with(mut self, host: &str, script: Script) -> Self {
        self.scripts.insert(host.to_string(), script);
        self
    }
}

impl Transport for Exchangers {
    type Stream = DuplexStream;

    async fn open(&self, host: &str, _port: u16) -> io::Result<Self::Stream> {
        self.opened.lock().unwrap().push(host.to_string());
        let Some(script) = self.scripts.get(host).copied() else {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ));
        };
        let (client, server) = tokio::io::duplex(8192);
        let host = host.to_string();
        let received = Arc::clone(&self.received);
        tokio::spawn(async move {
            if let Some(message) = serve(server, &host, script).await {
                received.lock().unwrap().push(message);
            }
        });
        Ok(client)
    }
}

/// Runs one scripted dialogue; returns what was accepted, if anything.
async fn serve(stream: DuplexStream, host: &str, script: Script) -> Option<Received> {
    let (mut rd, mut wr) = tokio::io::split(stream);
    if let Script::Silent = script {
        let _ = tokio::io::copy(&mut rd, &mut tokio::io::sink()).await;
        return None;
    }
    let mut matcher = TokenMatcher::from_stream(rd);
    let mut received = Received {
        host: host.to_string(),
        commands: Vec::new(),
        data: Vec::new(),
    };
    let mut accepted = false;

    wr.write_all(format!("220 {host} ESMTP ready\r\n").as_bytes())
        .await
        .ok()?;
    loop {
        let command = GrammarParser::new(&mut matcher).command().await.ok()?;
        received.commands.push(command.keyword().to_string());
        let reply = match (&command, script) {
            (Command::Ehlo { .. }, _) => format!("250-{host}\r\n250-8BITMIME\r\n250 SIZE 1000\r\n"),
            (Command::MailFrom { .. }, Script::RejectMail(code)) => {
                format!("{code} sender refused\r\n")
            }
            (Command::RcptTo { .. }, Script::RejectRcpt(code)) => {
                format!("{code} mailbox unavailable\r\n")
            }
            (Command::Data, _) => {
                wr.write_all(b"354 go ahead\r\n").await.ok()?;
                loop {
                    let line = matcher.cursor_mut().read_line(1024).await.ok()?;
                    if line == b"." {
                        break;
                    }
                    received.data.push(String::from_utf8(line).ok()?);
                }
                matcher.cursor_mut().compact();
                accepted = true;
                "250 queued\r\n".to_string()
            }
            (Command::Quit, _) => {
                wr.write_all(b"221 bye\r\n").await.ok()?;
                break;
            }
            _ => "250 ok\r\n".to_string(),
        };
        wr.write_all(reply.as_bytes()).await.ok()?;
    }
    accepted.then_some(received)
}

struct FixedLookup(Vec<ExchangeCandidate>);

impl ExchangerLookup for FixedLookup {
    async fn lookup(&self, _domain: &str) -> Result<Vec<ExchangeCandidate>, LookupError> {
        Ok(self.0.clone())
    }
}

async fn dispatcher(
    candidates: Vec<ExchangeCandidate>,
    exchangers: Exchangers,
) -> Dispatcher<FixedLookup, Exchangers> {
    dispatcher_with(Config::new("relay.example"), candidates, exchangers).await
}

async fn dispatcher_with(
    config: Config,
    candidates: Vec<ExchangeCandidate>,
    exchangers: Exchangers,
) -> Dispatcher<FixedLookup, Exchangers> {
    Dispatcher::new(config, FixedLookup(candidates), exchangers)
        .await
        .unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("mxsend_smtp=debug")
        .with_test_writer()
        .try_init();
}

fn to() -> Vec<String> {
    vec!["rcpt@example.org".to_string()]
}

#[tokio::test]
async fn test_single_exchanger_accepts() {
    init_tracing();
    let exchangers = Exchangers::default().with("mx.example.org", Script::Accept);
    let d = dispatcher(
        vec![ExchangeCandidate::new("mx.example.org.", 10)],
        exchangers.clone(),
    )
    .await;

    let delivery = d
        .send_mail(
            "sender@example.com",
            &to(),
            Some("Subject: hi\n\nhello\n.hidden\n".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(delivery.exchanger, "mx.example.org");
    assert_eq!(delivery.retried_hosts, 0);

    // The server task records after QUIT; give it a chance to finish.
    tokio::task::yield_now().await;
    let received = exchangers.received.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(
        received[0].commands,
        vec!["EHLO", "MAIL", "RCPT", "DATA", "QUIT"]
    );
    assert_eq!(
        received[0].data,
        vec!["Subject: hi", "", "hello", "..hidden"]
    );
}

#[tokio::test]
async fn test_failover_to_second_exchanger() {
    init_tracing();
    let exchangers = Exchangers::default()
        .with("mx1.example.org", Script::RejectMail(550))
        .with("mx2.example.org", Script::Accept);
    let d = dispatcher(
        vec![
            ExchangeCandidate::new("mx2.example.org", 20),
            ExchangeCandidate::new("mx1.example.org", 10),
        ],
        exchangers.clone(),
    )
    .await;

    let delivery = d
        .send_mail("sender@example.com", &to(), Some("hello".to_string()))
        .await
        .unwrap();
    assert_eq!(delivery.exchanger, "mx2.example.org");
    assert_eq!(delivery.retried_hosts, 1);
    assert_eq!(
        *exchangers.opened.lock().unwrap(),
        vec!["mx1.example.org", "mx2.example.org"]
    );
}

#[tokio::test]
async fn test_all_exchangers_fail() {
    let exchangers = Exchangers::default()
        .with("mx1.example.org", Script::RejectMail(550))
        .with("mx2.example.org", Script::RejectRcpt(451));
    let d = dispatcher(
        vec![
            ExchangeCandidate::new("mx1.example.org", 10),
            ExchangeCandidate::new("mx2.example.org", 20),
            ExchangeCandidate::new("mx3.example.org", 30),
        ],
        exchangers,
    )
    .await;

    let err = d
        .send_mail("", &to(), Some("bounce".to_string()))
        .await
        .unwrap_err();
    let DeliveryError::AllExchangersFailed { failures } = err else {
        panic!("unexpected {err:?}");
    };
    let hosts: Vec<_> = failures.iter().map(|f| f.host.as_str()).collect();
    assert_eq!(
        hosts,
        vec!["mx1.example.org", "mx2.example.org", "mx3.example.org"]
    );
    assert!(failures[0].reason.contains("550"));
    assert!(failures[1].reason.contains("451"));
    assert!(failures[2].reason.contains("refused"));
}

#[tokio::test]
async fn test_equal_preference_keeps_lookup_order() {
    let exchangers = Exchangers::default().with("d.example.org", Script::RejectMail(421));
    let d = dispatcher(
        vec![
            ExchangeCandidate::new("a.example.org", 10),
            ExchangeCandidate::new("b.example.org", 5),
            ExchangeCandidate::new("c.example.org", 5),
            ExchangeCandidate::new("d.example.org", 1),
        ],
        exchangers.clone(),
    )
    .await;

    let err = d.send_mail("sender@example.com", &to(), None).await;
    assert!(matches!(err, Err(DeliveryError::AllExchangersFailed { .. })));
    assert_eq!(
        *exchangers.opened.lock().unwrap(),
        vec![
            "d.example.org",
            "b.example.org",
            "c.example.org",
            "a.example.org"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_delivery_deadline_stops_failover() {
    init_tracing();
    let exchangers = Exchangers::default()
        .with("mx1.example.org", Script::Silent)
        .with("mx2.example.org", Script::Accept);
    let config = Config::builder("relay.example")
        .io_timeout(Duration::from_secs(60))
        .delivery_timeout(Duration::from_secs(5))
        .build();
    let d = dispatcher_with(
        config,
        vec![
            ExchangeCandidate::new("mx1.example.org", 10),
            ExchangeCandidate::new("mx2.example.org", 20),
        ],
        exchangers.clone(),
    )
    .await;

    let err = d
        .send_mail("sender@example.com", &to(), Some("hello".to_string()))
        .await
        .unwrap_err();
    let DeliveryError::AllExchangersFailed { failures } = err else {
        panic!("unexpected {err:?}");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].host, "mx1.example.org");
    assert!(failures[0].reason.contains("timed out after 5s"));
    assert_eq!(*exchangers.opened.lock().unwrap(), vec!["mx1.example.org"]);
}
