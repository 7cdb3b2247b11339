//! Tests for `Connection::open_scoped`

mod common;

use common::{client_config, init_tracing, server_config, EchoServer, TestCa};
use std::net::TcpListener;
use std::panic::AssertUnwindSafe;
use tls_conduit::{Connection, Error};

const PASSPHRASE: &str = "hunter2";

fn setup() -> (TestCa, EchoServer, String) {
    init_tracing();
    let ca = TestCa::new("scoped CA");
    let server = EchoServer::start(server_config(&ca.issue_server(), &ca));
    let client_pem = ca.issue_client("scoped-client").encrypted_pem(PASSPHRASE);
    (ca, server, client_pem)
}

#[derive(Debug)]
enum AppError {
    Conn(Error),
    Aborted,
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::Conn(err)
    }
}

#[test]
fn test_without_block_makes_no_connection() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let endpoint = format!("tls://127.0.0.1:{}", listener.local_addr().unwrap().port());

    let result = Connection::open_scoped(
        endpoint,
        "certificate",
        PASSPHRASE,
        None::<fn(&mut Connection) -> tls_conduit::Result<()>>,
    );

    assert!(matches!(result, Ok(None)));
    let accepted = listener.accept();
    assert!(matches!(
        accepted,
        Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock
    ));
}

#[test]
fn test_returns_block_value_and_closes() {
    let (ca, server, client_pem) = setup();

    let echoed = Connection::open_scoped_with_config(
        server.endpoint(),
        client_pem,
        client_config(&ca, PASSPHRASE),
        Some(|conn: &mut Connection| {
            assert!(conn.is_open());
            conn.write(b"scoped")?;
            let mut buf = [0u8; 6];
            let mut filled = 0;
            while filled < buf.len() {
                filled += conn.read(&mut buf[filled..])?;
            }
            Ok::<_, Error>(buf.to_vec())
        }),
    )
    .unwrap();

    assert_eq!(echoed, Some(b"scoped".to_vec()));
    assert!(server.wait_finished(1));
}

#[test]
fn test_closes_when_block_fails() {
    let (ca, server, client_pem) = setup();

    let result = Connection::open_scoped_with_config(
        server.endpoint(),
        client_pem,
        client_config(&ca, PASSPHRASE),
        Some(|conn: &mut Connection| {
            conn.write(b"partial")?;
            Err::<(), _>(AppError::Aborted)
        }),
    );

    assert!(matches!(result, Err(AppError::Aborted)));
    assert!(server.wait_finished(1));
}

#[test]
fn test_closes_when_block_panics() {
    let (ca, server, client_pem) = setup();

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
        let _ = Connection::open_scoped_with_config(
            server.endpoint(),
            client_pem,
            client_config(&ca, PASSPHRASE),
            Some(|_conn: &mut Connection| -> Result<(), Error> { panic!("block blew up") }),
        );
    }));

    assert!(outcome.is_err());
    assert!(server.wait_finished(1));
}

#[test]
fn test_open_failure_propagates_through_caller_error() {
    let (ca, server, client_pem) = setup();

    let result = Connection::open_scoped_with_config(
        server.endpoint(),
        client_pem,
        client_config(&ca, "not the passphrase"),
        Some(|_conn: &mut Connection| Ok::<_, AppError>(())),
    );

    assert!(matches!(result, Err(AppError::Conn(Error::KeyMaterial(_)))));
    assert_eq!(server.accepted(), 0);
}

#[test]
fn test_invalid_endpoint_with_block_fails() {
    let result = Connection::open_scoped(
        "no scheme here",
        "certificate",
        "",
        Some(|_conn: &mut Connection| Ok::<_, Error>(())),
    );
    assert!(matches!(result, Err(Error::InvalidEndpoint(_))));
}
