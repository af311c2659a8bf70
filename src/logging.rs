use tokio::sync::broadcast;
use tracing_subscriber::fmt::MakeWriter;

/// Tees formatted log lines to stdout and to the live log stream.
#[derive(Clone)]
pub(crate) struct LogFanout {
    pub sender: broadcast::Sender<String>,
    pub suppress_stdout: bool,
}

impl LogFanout {
    pub fn new(capacity: usize) -> (Self, broadcast::Sender<String>) {
        let (sender, _) = broadcast::channel(capacity);
        (
            Self {
                sender: sender.clone(),
                suppress_stdout: false,
            },
            sender,
        )
    }
}

impl<'a> MakeWriter<'a> for LogFanout {
    type Writer = FanoutWriter;

    fn make_writer(&'a self) -> Self::Writer {
        FanoutWriter {
            sender: self.sender.clone(),
            suppress_stdout: self.suppress_stdout,
        }
    }
}

pub(crate) struct FanoutWriter {
    sender: broadcast::Sender<String>,
    suppress_stdout: bool,
}

impl std::io::Write for FanoutWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let line = String::from_utf8_lossy(buf).to_string();
        // no receivers is fine
        let _ = self.sender.send(line);
        if !self.suppress_stdout {
            std::io::stdout().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.suppress_stdout {
            std::io::stdout().flush()?;
        }
        Ok(())
    }
}
