use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use crossbeam_utils::thread as scoped;
use notes::{
    Color, FsStore, Note, NotesClient, NotesError, NotesServer, RayonThreadPool, Request,
    Response, ResponseKind, ServerHandle, SharedQueueThreadPool, ThreadPool,
};
use serde::Deserialize;
use serde_json::{json, Deserializer, Value};
use tempfile::TempDir;
use walkdir::WalkDir;

fn start_server() -> (TempDir, ServerHandle) {
    let temp_dir = TempDir::new().expect("unable to create temporary working directory");
    let handle = notes::start(0, temp_dir.path().join("db")).expect("unable to start server");
    (temp_dir, handle)
}

/// reads one response from a raw connection
fn read_response(reader: &mut BufReader<TcpStream>) -> Value {
    let mut de = Deserializer::from_reader(reader);
    Value::deserialize(&mut de).expect("unable to read response")
}

fn raw_connection(addr: SocketAddr) -> (TcpStream, BufReader<TcpStream>) {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let reader = BufReader::new(stream.try_clone().unwrap());
    (stream, reader)
}

// add, read, remove then read again, all in one session
#[test]
fn client_session_add_read_remove() -> notes::Result<()> {
    let (_temp_dir, handle) = start_server();
    let mut client = NotesClient::connect(handle.connect_addr())?;
    client.set_timeout(Some(Duration::from_secs(5)))?;

    let note = Note::new("u1", "t1", "b", Color::Red);
    client.add(note.clone())?;
    assert_eq!(client.read("u1", "t1")?, note);

    client.remove("u1", "t1")?;
    match client.read("u1", "t1") {
        Err(NotesError::StringErr(msg)) => assert_eq!(msg, "Note does not exist"),
        other => panic!("unexpected result: {:?}", other),
    }

    client.close()?;
    handle.stop()
}

#[test]
fn wire_format_of_the_concrete_scenario() {
    let (_temp_dir, handle) = start_server();
    let (mut stream, mut reader) = raw_connection(handle.connect_addr());

    stream
        .write_all(br#"{"type":"add","user":"u1","title":"t1","body":"b","color":"red"}"#)
        .unwrap();
    assert_eq!(read_response(&mut reader), json!({"type": "add", "success": true}));

    stream.write_all(br#"{"type":"read","user":"u1","title":"t1"}"#).unwrap();
    assert_eq!(
        read_response(&mut reader),
        json!({
            "type": "read",
            "success": true,
            "notes": [{"user": "u1", "title": "t1", "body": "b", "color": "red"}]
        })
    );
}

#[test]
fn message_split_byte_by_byte_is_answered() {
    let (_temp_dir, handle) = start_server();
    let (mut stream, mut reader) = raw_connection(handle.connect_addr());
    stream.set_nodelay(true).unwrap();

    let message = br#"{"type":"add","user":"u","title":"t","body":"b","color":"blue"}"#;
    for byte in message.iter() {
        stream.write_all(&[*byte]).unwrap();
        stream.flush().unwrap();
    }
    assert_eq!(read_response(&mut reader), json!({"type": "add", "success": true}));
}

#[test]
fn unknown_requests_keep_the_session_open() {
    let (_temp_dir, handle) = start_server();
    let (mut stream, mut reader) = raw_connection(handle.connect_addr());
    let unknown = json!({"type": "unknown", "success": false, "error": "Unknown request"});

    stream.write_all(b"{}").unwrap();
    assert_eq!(read_response(&mut reader), unknown);

    stream.write_all(br#"{"type":"bogus"}"#).unwrap();
    assert_eq!(read_response(&mut reader), unknown);

    stream.write_all(b"{oops}").unwrap();
    assert_eq!(read_response(&mut reader), unknown);

    stream.write_all(br#"{"type":"list","user":"ghost"}"#).unwrap();
    assert_eq!(
        read_response(&mut reader),
        json!({"type": "list", "success": false, "error": "User does not exist"})
    );
}

#[test]
fn pipelined_requests_are_answered_in_order() {
    let (_temp_dir, handle) = start_server();
    let (mut stream, mut reader) = raw_connection(handle.connect_addr());

    stream
        .write_all(concat!(
            r#"{"type":"add","user":"u","title":"t","body":"b","color":"green"}"#,
            r#"{"type":"add","user":"u","title":"t","body":"b","color":"green"}"#,
            r#"{"type":"list","user":"u"}"#,
        ).as_bytes())
        .unwrap();

    assert_eq!(read_response(&mut reader), json!({"type": "add", "success": true}));
    assert_eq!(
        read_response(&mut reader),
        json!({"type": "add", "success": false, "error": "Note already exists"})
    );
    let list = read_response(&mut reader);
    assert_eq!(list["type"], json!("list"));
    assert_eq!(list["notes"].as_array().map(Vec::len), Some(1));
}

#[test]
fn update_replaces_body_and_color() -> notes::Result<()> {
    let (_temp_dir, handle) = start_server();
    let mut client = NotesClient::connect(handle.connect_addr())?;

    client.add(Note::new("u", "t", "old", Color::Red))?;
    let updated = client.update(Note::new("u", "t", "new", Color::Yellow))?;
    assert_eq!(updated, Note::new("u", "t", "new", Color::Yellow));
    assert_eq!(client.read("u", "t")?, updated);

    let resp = client.send(&Request::update(Note::new("u", "missing", "b", Color::Red)))?;
    assert_eq!(resp.kind, ResponseKind::Update);
    assert_eq!(resp.error.as_deref(), Some("Note does not exist"));
    Ok(())
}

#[test]
fn list_returns_every_note_of_a_user() -> notes::Result<()> {
    let (temp_dir, handle) = start_server();
    let mut client = NotesClient::connect(handle.connect_addr())?;

    for title in &["A", "B", "C"] {
        client.add(Note::new("U", *title, "body", Color::Green))?;
    }
    let notes = client.list("U")?;
    assert_eq!(notes.len(), 3);
    assert!(notes.iter().all(|note| note.user == "U"));

    // one file per note, one directory per user
    let files = WalkDir::new(temp_dir.path().join("db"))
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .count();
    assert_eq!(files, 3);

    // removing every note keeps the user directory, listing it yields no notes
    for title in &["A", "B", "C"] {
        client.remove("U", title)?;
    }
    assert!(temp_dir.path().join("db").join("U").is_dir());
    assert!(client.list("U")?.is_empty());
    Ok(())
}

#[test]
fn concurrent_sessions_are_served() {
    let (_temp_dir, handle) = start_server();
    let addr = handle.connect_addr();

    scoped::scope(|s| {
        for i in 0..8 {
            s.spawn(move |_| {
                let mut client = NotesClient::connect(addr).unwrap();
                let user = format!("user{}", i);
                for j in 0..5 {
                    let title = format!("title{}", j);
                    client.add(Note::new(user.as_str(), title.as_str(), "b", Color::Blue)).unwrap();
                }
                assert_eq!(client.list(&user).unwrap().len(), 5);
                client.close().unwrap();
            });
        }
    })
    .unwrap();
}

#[test]
fn same_note_added_concurrently_is_stored_once() {
    let (_temp_dir, handle) = start_server();
    let addr = handle.connect_addr();

    let added = scoped::scope(|s| {
        let workers: Vec<_> = (0..8)
            .map(|i| {
                s.spawn(move |_| {
                    let mut client = NotesClient::connect(addr).unwrap();
                    client
                        .add(Note::new("shared", "same", format!("body {}", i), Color::Red))
                        .is_ok()
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().unwrap())
            .filter(|added| *added)
            .count()
    })
    .unwrap();

    assert_eq!(added, 1);
}

#[test]
fn stopped_server_refuses_new_connections() {
    let temp_dir = TempDir::new().unwrap();
    let engine = FsStore::open(temp_dir.path()).unwrap();
    let server = NotesServer::new(engine, SharedQueueThreadPool::new(2).unwrap());
    let handle = server.start("127.0.0.1:0").unwrap();
    let addr = handle.connect_addr();

    let mut client = NotesClient::connect(addr).unwrap();
    client.add(Note::new("u", "t", "b", Color::Red)).unwrap();

    handle.stop().unwrap();
    // give the listener socket time to close
    thread::sleep(Duration::from_millis(50));
    assert!(TcpStream::connect(addr).is_err());

    // the open session is still served
    let resp: Response = client.send(&Request::Read { user: "u".into(), title: "t".into() }).unwrap();
    assert!(resp.success);
}

/// a server whose requests run on a single pooled thread
fn start_single_thread_server<P>(temp_dir: &TempDir) -> ServerHandle
where
    P: ThreadPool + Send + Sync + 'static,
{
    let engine = FsStore::open(temp_dir.path()).unwrap();
    let server = NotesServer::new(engine, P::new(1).unwrap());
    server.start("127.0.0.1:0").unwrap()
}

fn idle_session_does_not_block_others<P>()
where
    P: ThreadPool + Send + Sync + 'static,
{
    let temp_dir = TempDir::new().unwrap();
    let handle = start_single_thread_server::<P>(&temp_dir);
    let addr = handle.connect_addr();

    // the first client stays connected without sending anything more
    let mut idle = NotesClient::connect(addr).unwrap();
    idle.set_timeout(Some(Duration::from_secs(2))).unwrap();
    idle.add(Note::new("u", "t", "b", Color::Red)).unwrap();

    let mut other = NotesClient::connect(addr).unwrap();
    other.set_timeout(Some(Duration::from_secs(2))).unwrap();
    assert_eq!(other.read("u", "t").unwrap(), Note::new("u", "t", "b", Color::Red));
    other.close().unwrap();

    assert_eq!(idle.list("u").unwrap().len(), 1);
}

#[test]
fn idle_session_does_not_block_shared_queue_pool() {
    idle_session_does_not_block_others::<SharedQueueThreadPool>();
}

#[test]
fn idle_session_does_not_block_rayon_pool() {
    idle_session_does_not_block_others::<RayonThreadPool>();
}
