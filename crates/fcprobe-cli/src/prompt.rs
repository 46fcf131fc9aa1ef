//! Yes/no confirmation prompts

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};
use tokio::sync::Mutex;

use crate::Result;

/// Asks the operator a yes/no question
#[async_trait]
pub trait Confirm: Send + Sync {
    /// Returns `true` only on an explicit yes
    async fn confirm(&self, question: &str) -> Result<bool>;
}

/// Prompts on stderr and reads one answer line per question.
///
/// The reader is kept for the whole run so piped answers buffered past the
/// first line reach later prompts. Anything but `y`/`yes`, including end of
/// input, is a no.
pub struct LineConfirm<R> {
    reader: Mutex<R>,
}

/// Terminal prompts
pub type StdinConfirm = LineConfirm<BufReader<Stdin>>;

impl StdinConfirm {
    /// Prompt on the process's stdin
    pub fn stdin() -> Self {
        LineConfirm::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> LineConfirm<R> {
    /// Read answers from `reader`
    pub fn new(reader: R) -> Self {
        Self {
            reader: Mutex::new(reader),
        }
    }
}

#[async_trait]
impl<R> Confirm for LineConfirm<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn confirm(&self, question: &str) -> Result<bool> {
        // Prompt on stderr so it never mixes with report output
        let mut stderr = tokio::io::stderr();
        stderr
            .write_all(format!("{} [y/N] ", question).as_bytes())
            .await?;
        stderr.flush().await?;

        let mut input = String::new();
        self.reader.lock().await.read_line(&mut input).await?;
        Ok(is_yes(&input))
    }
}

/// Answers yes to everything (`--yes`)
#[derive(Clone, Copy, Debug, Default)]
pub struct AssumeYes;

#[async_trait]
impl Confirm for AssumeYes {
    async fn confirm(&self, _question: &str) -> Result<bool> {
        Ok(true)
    }
}

fn is_yes(input: &str) -> bool {
    let answer = input.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}
