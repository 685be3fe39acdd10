use bytes::Bytes;
use nagare::{
    config::DEFAULT_CODEC,
    error::AppendError,
    sink::{BufferSink, BufferedRange, CodecDescriptor, PipeSink},
    NagareError, Player, PlayerConfig,
};
use url::Url;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::fmp4::fragment;

async fn setup_fragments(fragments: &[(&str, Vec<u8>)]) -> MockServer {
    let mock_server = MockServer::start().await;
    for (name, data) in fragments {
        Mock::given(method("GET"))
            .and(path(format!("/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(data.clone()))
            .mount(&mock_server)
            .await;
    }
    mock_server
}

#[tokio::test]
async fn test_pipe_sink_timeline() -> anyhow::Result<()> {
    let mut sink = PipeSink::new(Vec::new(), CodecDescriptor::parse(DEFAULT_CODEC)?);
    assert_eq!(sink.buffered_end(), None);

    let first = fragment(b"avc1", 2);
    sink.append(Bytes::from(first.clone())).await?;
    assert_eq!(sink.buffered_end(), Some(2.));

    sink.set_offset(2.);
    let second = fragment(b"avc3", 3);
    sink.append(Bytes::from(second.clone())).await?;
    assert_eq!(sink.buffered(), &[BufferedRange::new(0., 5.)]);

    sink.end_of_stream().await?;
    assert_eq!(sink.into_inner().len(), first.len() + second.len());

    Ok(())
}

#[tokio::test]
async fn test_codec_mismatch_is_rejected() -> anyhow::Result<()> {
    let mut sink = PipeSink::new(Vec::new(), CodecDescriptor::parse(DEFAULT_CODEC)?);
    let error = sink
        .append(Bytes::from(fragment(b"hvc1", 2)))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        NagareError::AppendError(AppendError::CodecMismatch { .. })
    ));
    assert!(error.is_fatal());
    assert!(sink.into_inner().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_append_after_end_of_stream() -> anyhow::Result<()> {
    let mut sink = PipeSink::new(Vec::new(), CodecDescriptor::parse(DEFAULT_CODEC)?);
    sink.end_of_stream().await?;
    let error = sink
        .append(Bytes::from(fragment(b"avc1", 2)))
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        NagareError::AppendError(AppendError::Closed)
    ));

    Ok(())
}

#[tokio::test]
#[should_panic(expected = "previous append is outstanding")]
async fn test_overlapping_append_panics() {
    use std::future::Future;

    // nobody reads the other end, so writes stall once 8 bytes are buffered
    let (writer, _reader) = tokio::io::duplex(8);
    let mut sink = PipeSink::new(writer, CodecDescriptor::parse(DEFAULT_CODEC).unwrap());
    let data = Bytes::from(fragment(b"avc1", 2));
    {
        // abandon an append before it signals completion
        let append = sink.append(data.clone());
        futures::pin_mut!(append);
        let waker = futures::task::noop_waker();
        let mut cx = std::task::Context::from_waker(&waker);
        let _ = append.as_mut().poll(&mut cx);
    }
    let _ = sink.append(data).await;
}

#[tokio::test]
async fn test_player_writes_fragments_to_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("out.mp4");

    let fragments = vec![
        ("seg_0.mp4", fragment(b"avc1", 2)),
        ("seg_1.mp4", fragment(b"avc1", 2)),
        ("seg_2.mp4", fragment(b"avc1", 1)),
    ];
    let mock_server = setup_fragments(&fragments).await;
    let config = PlayerConfig::fixed(
        fragments.iter().map(|(name, _)| name.to_string()).collect(),
        Url::parse(&format!("{}/", mock_server.uri()))?,
    );

    let sink = PipeSink::file(&output, CodecDescriptor::parse(&config.codec)?).await?;
    let report = Player::from_config(&config, sink)?.run().await?;
    assert_eq!(report.appended, 3);

    let written = tokio::fs::read(&output).await?;
    let expected: Vec<u8> = fragments.into_iter().flat_map(|(_, data)| data).collect();
    assert_eq!(written, expected);

    Ok(())
}

#[tokio::test]
async fn test_player_stops_on_codec_mismatch() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("out.mp4");

    let fragments = vec![("seg_0.mp4", fragment(b"hvc1", 2))];
    let mock_server = setup_fragments(&fragments).await;
    let config = PlayerConfig::fixed(
        vec!["seg_0.mp4".to_string()],
        Url::parse(&format!("{}/", mock_server.uri()))?,
    );

    let sink = PipeSink::file(&output, CodecDescriptor::parse(DEFAULT_CODEC)?).await?;
    let result = Player::from_config(&config, sink)?.run().await;
    assert!(matches!(
        result,
        Err(NagareError::AppendError(AppendError::CodecMismatch { .. }))
    ));
    assert!(tokio::fs::read(&output).await?.is_empty());

    Ok(())
}
