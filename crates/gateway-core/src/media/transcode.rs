//! Subprocess audio transcoding, grounded directly in
//! `original_source/stdapi/media.py`'s `encode_audio_stream`: pipes input
//! bytes into `ffmpeg` over stdin and streams encoded output from stdout,
//! so the gateway never buffers a full audio file in memory.

use std::process::Stdio;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::error::MediaError;

const CHUNK_SIZE: usize = 65536;

fn ffmpeg_format_alias(format: &str) -> &str {
    match format {
        "aac" => "adts",
        "pcm" => "s16le",
        "vorbis" => "ogg",
        other => other,
    }
}

/// Mirrors `encode_audio_stream`'s required fields for raw PCM input.
pub struct PcmInputSpec {
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// Spawns `ffmpeg`, feeds it `input` on a background task, and returns a
/// stream of encoded output chunks. `input_format` is `None` to let ffmpeg
/// autodetect an already-encoded container; `Some` (with `pcm_spec`) is
/// required for raw PCM.
pub async fn encode_audio_stream(
    input: Vec<u8>,
    output_format: &str,
    input_format: Option<&str>,
    pcm_spec: Option<PcmInputSpec>,
) -> Result<ReceiverStream<Result<Vec<u8>, MediaError>>, MediaError> {
    let mut args: Vec<String> = Vec::new();

    if let Some(input_format) = input_format {
        args.push("-f".to_string());
        args.push(ffmpeg_format_alias(input_format).to_string());
        if let Some(spec) = &pcm_spec {
            match (spec.sample_rate, spec.channels) {
                (None, None) => {
                    return Err(MediaError::TranscodeFailed(
                        "sample_rate or channels must be specified for raw PCM".to_string(),
                    ));
                }
                (Some(sample_rate), _) => {
                    args.push("-ar".to_string());
                    args.push(sample_rate.to_string());
                }
                _ => {}
            }
            if let Some(channels) = spec.channels {
                args.push("-ac".to_string());
                args.push(channels.to_string());
            }
        }
    }

    args.extend([
        "-i".to_string(),
        "pipe:0".to_string(),
        "-q:a".to_string(),
        "0".to_string(),
        "-f".to_string(),
        ffmpeg_format_alias(output_format).to_string(),
        "pipe:1".to_string(),
    ]);

    let mut child = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|_| MediaError::TranscoderUnavailable)?;

    let mut stdin = child.stdin.take().expect("stdin piped");
    tokio::spawn(async move {
        let _ = stdin.write_all(&input).await;
        let _ = stdin.shutdown().await;
    });

    let mut stdout = child.stdout.take().expect("stdout piped");
    let (tx, rx) = mpsc::channel(8);

    tokio::spawn(async move {
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            match stdout.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(Ok(buffer[..n].to_vec())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(MediaError::TranscodeFailed(e.to_string()))).await;
                    break;
                }
            }
        }
        let _ = child.wait().await;
    });

    Ok(ReceiverStream::new(rx))
}
