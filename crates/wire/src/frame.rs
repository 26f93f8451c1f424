//! Length-prefixed frames.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Result, WireError};

/// Largest accepted frame body.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// One unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
	/// Client to server.
	Request(Request),
	/// Server to client.
	Response(Response),
}

/// Unary call issued by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
	/// Correlates the response; chosen by the client.
	pub id: u64,
	/// Target method name.
	pub method: String,
	/// Encoded request message.
	pub payload: Vec<u8>,
}

/// Answer to one [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
	/// Id of the request being answered.
	pub id: u64,
	/// Status code; `0` is OK.
	pub code: u32,
	/// Status message; empty on success.
	pub message: String,
	/// Encoded response message; empty on failure.
	pub payload: Vec<u8>,
}

/// Writes one frame and flushes.
///
/// # Errors
///
/// Fails if the frame cannot be encoded, is larger than [`MAX_FRAME_LEN`], or
/// the stream errors.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
	W: AsyncWrite + Unpin,
{
	let buf = postcard::to_allocvec(frame)?;
	let len = checked_len(buf.len())?;
	writer.write_u32_le(len).await?;
	writer.write_all(&buf).await?;
	writer.flush().await?;
	Ok(())
}

/// Reads one frame. Returns `None` on a clean end of stream between frames.
///
/// # Errors
///
/// Fails on a truncated frame, an oversized length prefix, or an undecodable
/// body.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>>
where
	R: AsyncRead + Unpin,
{
	let mut prefix = [0u8; 4];
	match reader.read_u8().await {
		Ok(first) => prefix[0] = first,
		Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
		Err(err) => return Err(err.into()),
	}
	// EOF past the first byte is a cut-off prefix, not a clean close.
	reader.read_exact(&mut prefix[1..]).await?;
	let len = u32::from_le_bytes(prefix) as usize;
	if len > MAX_FRAME_LEN {
		return Err(WireError::FrameTooLarge { len, max: MAX_FRAME_LEN });
	}
	let mut buf = vec![0u8; len];
	reader.read_exact(&mut buf).await?;
	Ok(Some(postcard::from_bytes(&buf)?))
}

fn checked_len(len: usize) -> Result<u32> {
	if len > MAX_FRAME_LEN {
		return Err(WireError::FrameTooLarge { len, max: MAX_FRAME_LEN });
	}
	Ok(len as u32)
}

#[cfg(test)]
mod tests {
	use tokio::io::duplex;

	use super::*;

	fn request(id: u64) -> Frame {
		Frame::Request(Request {
			id,
			method: "SayHello".into(),
			payload: vec![1, 2, 3],
		})
	}

	#[tokio::test]
	async fn frames_cross_a_stream_in_order() {
		let (mut client, mut server) = duplex(1024);
		write_frame(&mut client, &request(1)).await.unwrap();
		write_frame(
			&mut client,
			&Frame::Response(Response {
				id: 1,
				code: 5,
				message: "missing".into(),
				payload: Vec::new(),
			}),
		)
		.await
		.unwrap();
		drop(client);

		assert_eq!(read_frame(&mut server).await.unwrap(), Some(request(1)));
		let Some(Frame::Response(resp)) = read_frame(&mut server).await.unwrap() else {
			panic!("expected response");
		};
		assert_eq!((resp.id, resp.code, resp.message.as_str()), (1, 5, "missing"));
		assert!(read_frame(&mut server).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn oversized_prefix_is_rejected_before_allocating() {
		let (mut client, mut server) = duplex(64);
		client.write_u32_le(u32::MAX).await.unwrap();
		let err = read_frame(&mut server).await.unwrap_err();
		assert!(matches!(err, WireError::FrameTooLarge { max: MAX_FRAME_LEN, .. }), "{err}");
	}

	#[tokio::test]
	async fn truncated_body_is_an_io_error() {
		let (mut client, mut server) = duplex(64);
		client.write_u32_le(10).await.unwrap();
		client.write_all(&[0, 1]).await.unwrap();
		drop(client);
		assert!(matches!(read_frame(&mut server).await.unwrap_err(), WireError::Io(_)));
	}

	#[tokio::test]
	async fn truncated_prefix_is_an_io_error() {
		let (mut client, mut server) = duplex(64);
		client.write_all(&[7, 0]).await.unwrap();
		drop(client);
		let err = read_frame(&mut server).await.unwrap_err();
		assert!(matches!(&err, WireError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof), "{err}");
	}

	#[tokio::test]
	async fn garbage_body_is_a_codec_error() {
		let (mut client, mut server) = duplex(64);
		client.write_u32_le(1).await.unwrap();
		client.write_all(&[0xff]).await.unwrap();
		assert!(matches!(read_frame(&mut server).await.unwrap_err(), WireError::Codec(_)));
	}
}
