// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::request::Request;
use warden_core::run::RunId;

#[tokio::test]
async fn round_trips_a_message_through_a_duplex_pipe() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    let req = Request::GetJobStatus { run_id: RunId::new() };

    write_message(&mut client, &req).await.unwrap();
    let decoded: Request = read_message(&mut server).await.unwrap();

    match (req, decoded) {
        (Request::GetJobStatus { run_id: a }, Request::GetJobStatus { run_id: b }) => {
            assert_eq!(a, b)
        }
        _ => panic!("wrong variant decoded"),
    }
}

#[tokio::test]
async fn reading_past_a_clean_close_is_unexpected_eof() {
    let (client, mut server) = tokio::io::duplex(64);
    drop(client);

    let err = read_message::<_, Request>(&mut server).await.unwrap_err();
    assert!(matches!(err, ProtocolError::UnexpectedEof));
}

#[tokio::test]
async fn oversized_length_prefix_is_rejected_before_allocating() {
    let (mut client, mut server) = tokio::io::duplex(64);
    let huge_len = (MAX_FRAME_BYTES as u32 + 1).to_be_bytes();
    client.write_all(&huge_len).await.unwrap();

    let err = read_message::<_, Request>(&mut server).await.unwrap_err();
    assert!(matches!(err, ProtocolError::FrameTooLarge(_, _)));
}

#[tokio::test]
async fn multiple_messages_are_framed_independently() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    write_message(&mut client, &Request::Ping).await.unwrap();
    write_message(&mut client, &Request::Health).await.unwrap();

    let first: Request = read_message(&mut server).await.unwrap();
    let second: Request = read_message(&mut server).await.unwrap();
    assert!(matches!(first, Request::Ping));
    assert!(matches!(second, Request::Health));
}
