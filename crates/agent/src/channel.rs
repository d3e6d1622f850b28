//! Answer channels for interactive questions
//!
//! `LineChannel` reads and writes plain lines (the terminal REPL uses it over
//! stdin/stdout). `DetachedChannel` backs HTTP-only sessions, which have no
//! way to ask a follow-up question.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;

use chia_core::{AnswerChannel, Error, Result};

/// Line-oriented channel over any async reader/writer pair
pub struct LineChannel<R, W> {
    reader: Mutex<Lines<R>>,
    writer: Mutex<W>,
    name: String,
}

impl<R, W> LineChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W, name: impl Into<String>) -> Self {
        Self {
            reader: Mutex::new(reader.lines()),
            writer: Mutex::new(writer),
            name: name.into(),
        }
    }

    async fn write(&self, text: &str, newline: bool) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(text.as_bytes()).await?;
        if newline {
            writer.write_all(b"\n").await?;
        }
        writer.flush().await?;
        Ok(())
    }

    /// Next input line; `None` at end of input
    pub async fn read_line(&self) -> Result<Option<String>> {
        Ok(self.reader.lock().await.next_line().await?)
    }

    /// Write a prompt without a newline and read the reply line
    pub async fn prompt(&self, prompt: &str) -> Result<Option<String>> {
        self.write(prompt, false).await?;
        self.read_line().await
    }
}

impl LineChannel<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Channel over the process terminal
    pub fn stdio() -> Self {
        Self::new(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            "terminal",
        )
    }
}

#[async_trait]
impl<R, W> AnswerChannel for LineChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn ask(&self, prompt: &str) -> Result<String> {
        self.prompt(prompt)
            .await?
            .ok_or_else(|| Error::Channel("Input closed".to_string()))
    }

    async fn notify(&self, text: &str) -> Result<()> {
        self.write(text, true).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Channel for sessions without an interactive connection
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedChannel;

#[async_trait]
impl AnswerChannel for DetachedChannel {
    async fn ask(&self, _prompt: &str) -> Result<String> {
        Err(Error::Channel(
            "Interactive questions are not available on this connection; use the WebSocket or terminal client"
                .to_string(),
        ))
    }

    async fn notify(&self, text: &str) -> Result<()> {
        tracing::debug!(text, "Dropping notification on detached session");
        Ok(())
    }

    fn name(&self) -> &str {
        "detached"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_line_channel() {
        let input: &[u8] = b"yes\n  No \n";
        let channel = LineChannel::new(input, Vec::<u8>::new(), "test");

        channel.notify("Header").await.unwrap();
        assert_eq!(channel.ask("Q1? ").await.unwrap(), "yes");
        assert_eq!(channel.ask("Q2? ").await.unwrap(), "  No ");
        assert!(matches!(channel.ask("Q3? ").await, Err(Error::Channel(_))));

        let written = String::from_utf8(channel.writer.lock().await.clone()).unwrap();
        assert_eq!(written, "Header\nQ1? Q2? Q3? ");
    }

    #[tokio::test]
    async fn test_detached_channel() {
        let channel = DetachedChannel;
        assert!(channel.notify("hi").await.is_ok());
        let err = channel.ask("Q?").await.unwrap_err();
        assert!(err.is_channel_closed());
    }
}
