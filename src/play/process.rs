use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::Builder;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use strum_macros::Display;

use crate::logger;
use crate::utils::Res;

/// Result of a driver operation. A timeout does not kill the child; cleanup
/// is deferred until the owning session drops.
#[derive(Debug, Display, Copy, Clone, Eq, PartialEq)]
pub enum Status {
    Ok,
    Timeout,
    ProcessDied,
    Error,
}

#[derive(Debug, Display, Copy, Clone, Eq, PartialEq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// One captured line of child output, tagged with its stream and capture time.
#[derive(Debug, Clone)]
pub struct Line {
    pub content: String,
    pub kind: StreamKind,
    pub received: DateTime<Utc>,
}

/// Bounded ring of recent child output. Old lines fall off the front once the
/// capacity is reached, which bounds memory for engines that spew between
/// terminators.
#[derive(Debug)]
pub struct LineBuffer {
    lines: VecDeque<Line>,
    capacity: usize,
}

impl LineBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            lines: VecDeque::with_capacity(capacity.min(128)),
            capacity,
        }
    }

    pub fn push(&mut self, line: Line) {
        if self.lines.len() == self.capacity {
            _ = self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Line> {
        self.lines.iter()
    }

    pub fn last(&self) -> Option<&Line> {
        self.lines.back()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// A line is the terminator when it starts with the expected token, i.e. the
/// token is the whole line or is followed by whitespace (`bestmove e2e4`).
fn is_terminator(line: &str, terminator: &str) -> bool {
    let line = line.trim_end();
    line == terminator
        || (line.starts_with(terminator)
            && line.as_bytes()[terminator.len()].is_ascii_whitespace())
}

/// Owns one engine child process and its pipe pair. Two detached reader
/// threads pump stdout and stderr into a channel; reads happen on the calling
/// thread with a deadline. Dropping the driver kills and reaps the child.
#[derive(Debug)]
pub struct Process {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<Line>,
    label: String,
    started: Instant,
}

impl Process {
    pub fn start(
        dir: Option<&Path>,
        cmd: &str,
        args: &[String],
        label: &str,
        realtime_logging: bool,
    ) -> Res<Self> {
        let mut command = Command::new(cmd);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = dir {
            command.current_dir(dir);
        }
        let mut child = command
            .spawn()
            .map_err(|err| anyhow!("Couldn't start engine process '{cmd}': {err}"))?;
        let stdin = child.stdin.take().unwrap();
        let stdout = child.stdout.take().unwrap();
        let stderr = child.stderr.take().unwrap();

        let (tx, lines) = unbounded();
        Self::spawn_reader(stdout, StreamKind::Stdout, tx.clone(), label, realtime_logging);
        Self::spawn_reader(stderr, StreamKind::Stderr, tx, label, realtime_logging);

        Ok(Self {
            child,
            stdin,
            lines,
            label: label.to_string(),
            started: Instant::now(),
        })
    }

    fn spawn_reader<R: Read + Send + 'static>(
        stream: R,
        kind: StreamKind,
        tx: Sender<Line>,
        label: &str,
        realtime_logging: bool,
    ) {
        let label = label.to_string();
        Builder::new()
            .name(format!("{label} {kind}"))
            .spawn(move || {
                for line in BufReader::new(stream).lines() {
                    let Ok(content) = line else { break };
                    if realtime_logging {
                        logger::read_from_engine(&label, &content, kind == StreamKind::Stderr);
                    }
                    let line = Line {
                        content,
                        kind,
                        received: Utc::now(),
                    };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                // sender drops here; once both streams hit EOF the channel
                // disconnects and reads report ProcessDied
            })
            .unwrap();
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Writes one protocol line, appending the newline if absent.
    pub fn write_input(&mut self, line: &str) -> Status {
        let mut msg = line.trim_end_matches('\n').to_string();
        msg.push('\n');
        match self.stdin.write_all(msg.as_bytes()).and_then(|()| self.stdin.flush()) {
            Ok(()) => Status::Ok,
            Err(_) => Status::Error,
        }
    }

    /// Appends child output to `sink` until a stdout line starts with
    /// `terminator`, the deadline expires, or the child exits. `None` blocks
    /// without a deadline.
    pub fn read_output(
        &mut self,
        sink: &mut LineBuffer,
        terminator: &str,
        deadline: Option<Duration>,
    ) -> Status {
        let deadline = deadline.map(|d| Instant::now() + d);
        loop {
            let next = match deadline {
                Some(deadline) => self.lines.recv_deadline(deadline).map_err(|err| match err {
                    RecvTimeoutError::Timeout => Status::Timeout,
                    RecvTimeoutError::Disconnected => Status::ProcessDied,
                }),
                None => self.lines.recv().map_err(|_| Status::ProcessDied),
            };
            match next {
                Err(status) => return status,
                Ok(line) => {
                    let done =
                        line.kind == StreamKind::Stdout && is_terminator(&line.content, terminator);
                    sink.push(line);
                    if done {
                        return Status::Ok;
                    }
                }
            }
        }
    }

    /// Non-blocking liveness probe.
    pub fn alive(&mut self) -> Status {
        match self.child.try_wait() {
            Ok(None) => Status::Ok,
            _ => Status::ProcessDied,
        }
    }

    /// Polls for a voluntary exit, e.g. after `quit`. Returns true iff the
    /// child exited within the grace period.
    pub fn wait_for_exit(&mut self, grace: Duration) -> bool {
        let start = Instant::now();
        loop {
            if let Ok(Some(_)) = self.child.try_wait() {
                return true;
            }
            if start.elapsed() >= grace {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        _ = self.child.kill();
        // reap so the child doesn't linger as a zombie
        _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminator_is_a_leading_token() {
        assert!(is_terminator("bestmove e2e4", "bestmove"));
        assert!(is_terminator("bestmove e2e4 ponder e7e5", "bestmove"));
        assert!(is_terminator("usiok", "usiok"));
        assert!(is_terminator("readyok\r", "readyok"));
        assert!(!is_terminator("info string bestmove e2e4", "bestmove"));
        assert!(!is_terminator("bestmoves", "bestmove"));
        assert!(!is_terminator("usiok2", "usiok"));
    }

    #[test]
    fn line_buffer_drops_oldest() {
        let mut buffer = LineBuffer::new(2);
        let line = |content: &str| Line {
            content: content.to_string(),
            kind: StreamKind::Stdout,
            received: Utc::now(),
        };
        buffer.push(line("a"));
        buffer.push(line("b"));
        buffer.push(line("c"));
        assert_eq!(buffer.len(), 2);
        let contents: Vec<_> = buffer.iter().map(|l| l.content.as_str()).collect();
        assert_eq!(contents, ["b", "c"]);
        assert_eq!(buffer.last().unwrap().content, "c");
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
