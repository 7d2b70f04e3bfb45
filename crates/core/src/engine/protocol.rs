//! UCI line protocol
//!
//! [`UciChannel`] writes commands and reads replies over any async byte
//! stream, so the same code talks to a child process or to an in-memory
//! engine. [`classify_line`] turns one output line into [`EngineEvent`]s.

use std::collections::VecDeque;
use std::str::FromStr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::interpreter::{Interpreter, RawEvaluation};
use super::{EngineError, SearchRequest};

/// Reply to `isready`
pub const READY_MARKER: &str = "readyok";
/// Reply to `uci` once all options are listed
pub const HANDSHAKE_MARKER: &str = "uciok";
/// Prefix of the terminal line of a search
pub const BEST_MOVE_MARKER: &str = "bestmove";

/// Whether an engine marked a score as a search-window bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Lower,
    Upper,
}

/// One classified piece of engine output.
///
/// `rank` is the `multipv` index of the line the event came from (1 when the
/// engine does not report one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    ScoreCentipawns {
        rank: u32,
        value: i32,
        bound: Option<Bound>,
    },
    ScoreMate {
        rank: u32,
        mate_in: i32,
    },
    PrincipalVariation {
        rank: u32,
        moves: Vec<String>,
    },
    /// `None` when the engine has no move to offer (`bestmove (none)`)
    BestMove(Option<String>),
    Other,
}

/// Classifies one line of engine output.
///
/// An `info` line can carry both a score and a principal variation, in which
/// case the score event comes first. A `bestmove` line without a move, or a
/// score whose value does not parse, is [`EngineError::MalformedOutput`].
pub fn classify_line(line: &str) -> Result<Vec<EngineEvent>, EngineError> {
    let line = line.trim();

    if line.starts_with(BEST_MOVE_MARKER) {
        let mut parts = line.split_whitespace().skip(1);
        return match parts.next() {
            Some("(none)") | Some("0000") => Ok(vec![EngineEvent::BestMove(None)]),
            Some(mv) => Ok(vec![EngineEvent::BestMove(Some(mv.to_string()))]),
            None => Err(EngineError::MalformedOutput(line.to_string())),
        };
    }

    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.first() != Some(&"info") {
        return Ok(vec![EngineEvent::Other]);
    }

    let mut rank = 1;
    let mut score = None;
    let mut pv = None;

    let mut i = 1;
    while i < parts.len() {
        match parts[i] {
            // Free text until the end of the line
            "string" => break,
            "multipv" => {
                rank = parse_value(&parts, i + 1, line)?;
                i += 2;
            }
            "score" => {
                let value = parse_value(&parts, i + 2, line)?;
                match parts.get(i + 1) {
                    Some(&"cp") => {
                        let bound = match parts.get(i + 3) {
                            Some(&"lowerbound") => Some(Bound::Lower),
                            Some(&"upperbound") => Some(Bound::Upper),
                            _ => None,
                        };
                        score = Some(Score::Centipawns(value, bound));
                    }
                    Some(&"mate") => score = Some(Score::Mate(value)),
                    _ => return Err(EngineError::MalformedOutput(line.to_string())),
                }
                i += 3;
            }
            "pv" => {
                let moves: Vec<String> = parts[i + 1..].iter().map(|s| s.to_string()).collect();
                if !moves.is_empty() {
                    pv = Some(moves);
                }
                break;
            }
            _ => i += 1,
        }
    }

    // Ranks are attached last since multipv may follow the score
    let mut events = Vec::with_capacity(2);
    match score {
        Some(Score::Centipawns(value, bound)) => {
            events.push(EngineEvent::ScoreCentipawns { rank, value, bound })
        }
        Some(Score::Mate(mate_in)) => events.push(EngineEvent::ScoreMate { rank, mate_in }),
        None => {}
    }
    if let Some(moves) = pv {
        events.push(EngineEvent::PrincipalVariation { rank, moves });
    }
    if events.is_empty() {
        events.push(EngineEvent::Other);
    }
    Ok(events)
}

enum Score {
    Centipawns(i32, Option<Bound>),
    Mate(i32),
}

fn parse_value<T: FromStr>(parts: &[&str], index: usize, line: &str) -> Result<T, EngineError> {
    parts
        .get(index)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| EngineError::MalformedOutput(line.to_string()))
}

/// Command/response channel to a UCI engine
pub struct UciChannel<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> UciChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Writes one command line and flushes it.
    pub async fn send_command(&mut self, command: &str) -> Result<(), EngineError> {
        debug!(command, "-> engine");
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Reads one trimmed line. End of stream is [`EngineError::Disconnected`].
    ///
    /// Bytes that are not UTF-8 are replaced rather than rejected. A failed
    /// read also counts as a disconnect; only writes surface as `Io`.
    pub async fn read_line(&mut self) -> Result<String, EngineError> {
        let mut buf = Vec::new();
        let bytes = self.reader.read_until(b'\n', &mut buf).await.map_err(|err| {
            warn!(%err, "engine output unreadable");
            EngineError::Disconnected
        })?;
        if bytes == 0 {
            return Err(EngineError::Disconnected);
        }
        let line = String::from_utf8_lossy(&buf).trim().to_string();
        debug!(line = %line, "<- engine");
        Ok(line)
    }

    /// Reads until a line is exactly `readyok` or `uciok`.
    pub async fn await_ready(&mut self) -> Result<(), EngineError> {
        loop {
            let line = self.read_line().await?;
            if line == READY_MARKER || line == HANDSHAKE_MARKER {
                return Ok(());
            }
        }
    }

    /// Startup handshake: `uci`, the given options, then `isready`.
    ///
    /// Returns the engine's name as reported by `id name`.
    pub async fn handshake(&mut self, options: &[(&str, String)]) -> Result<String, EngineError> {
        self.send_command("uci").await?;

        let mut name = String::new();
        loop {
            let line = self.read_line().await?;
            if let Some(id) = line.strip_prefix("id name ") {
                name = id.to_string();
            } else if line == HANDSHAKE_MARKER || line == READY_MARKER {
                break;
            }
        }

        for (option, value) in options {
            self.send_command(&format!("setoption name {} value {}", option, value))
                .await?;
        }

        self.send_command("isready").await?;
        self.await_ready().await?;

        if name.is_empty() {
            name = "Unknown Engine".to_string();
        }
        Ok(name)
    }

    /// Starts a search and returns the lazy stream of its events.
    pub async fn run_search(
        &mut self,
        request: &SearchRequest,
    ) -> Result<Search<'_, R, W>, EngineError> {
        self.send_command("ucinewgame").await?;
        self.send_command(&format!("position fen {}", request.fen()))
            .await?;
        self.send_command(&format!("go depth {}", request.depth()))
            .await?;

        Ok(Search {
            channel: self,
            pending: VecDeque::new(),
            finished: false,
        })
    }
}

/// Events of one running search, read on demand.
///
/// Ends after the `bestmove` line; nothing past it is read.
pub struct Search<'a, R, W> {
    channel: &'a mut UciChannel<R, W>,
    pending: VecDeque<EngineEvent>,
    finished: bool,
}

impl<R, W> Search<'_, R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Next event, or `None` once the best move has been delivered.
    pub async fn next_event(&mut self) -> Result<Option<EngineEvent>, EngineError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.finished {
                return Ok(None);
            }

            let line = self.channel.read_line().await?;
            match classify_line(&line) {
                Ok(events) => {
                    if events.iter().any(|e| matches!(e, EngineEvent::BestMove(_))) {
                        self.finished = true;
                    }
                    self.pending.extend(events);
                }
                Err(err) if line.starts_with(BEST_MOVE_MARKER) => return Err(err),
                Err(err) => warn!(%err, "skipping engine line"),
            }
        }
    }

    /// Feeds every event into a fresh [`Interpreter`].
    pub async fn evaluate(mut self) -> Result<RawEvaluation, EngineError> {
        let mut interpreter = Interpreter::default();
        while let Some(event) = self.next_event().await? {
            if interpreter.apply(event).is_break() {
                break;
            }
        }
        Ok(interpreter.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, split, AsyncReadExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

    type TestChannel = UciChannel<BufReader<ReadHalf<DuplexStream>>, WriteHalf<DuplexStream>>;

    /// Channel plus the engine's end of the pipe
    fn channel() -> (TestChannel, DuplexStream) {
        let (ours, theirs) = duplex(4096);
        let (read, write) = split(ours);
        (UciChannel::new(BufReader::new(read), write), theirs)
    }

    #[test]
    fn test_classify_centipawn_with_pv() {
        let events =
            classify_line("info depth 15 seldepth 20 score cp 35 nodes 50000 pv e2e4 e7e5 g1f3")
                .unwrap();
        assert_eq!(
            events,
            vec![
                EngineEvent::ScoreCentipawns { rank: 1, value: 35, bound: None },
                EngineEvent::PrincipalVariation {
                    rank: 1,
                    moves: vec!["e2e4".into(), "e7e5".into(), "g1f3".into()],
                },
            ]
        );
    }

    #[test]
    fn test_classify_bounds() {
        let lower = classify_line("info depth 9 score cp 40 lowerbound nodes 100").unwrap();
        assert_eq!(
            lower,
            vec![EngineEvent::ScoreCentipawns { rank: 1, value: 40, bound: Some(Bound::Lower) }]
        );

        let upper = classify_line("info depth 9 score cp -12 upperbound nodes 100").unwrap();
        assert_eq!(
            upper,
            vec![EngineEvent::ScoreCentipawns { rank: 1, value: -12, bound: Some(Bound::Upper) }]
        );
    }

    #[test]
    fn test_classify_mate_keeps_sign() {
        let events = classify_line("info depth 12 score mate -3 nodes 10000 pv d1h5 g6h5").unwrap();
        assert_eq!(events[0], EngineEvent::ScoreMate { rank: 1, mate_in: -3 });
        assert!(matches!(events[1], EngineEvent::PrincipalVariation { rank: 1, .. }));
    }

    #[test]
    fn test_classify_multipv_rank_is_not_a_pv_marker() {
        let events = classify_line("info depth 20 multipv 2 score cp 18 nodes 9 pv d2d4 d7d5").unwrap();
        assert_eq!(events[0], EngineEvent::ScoreCentipawns { rank: 2, value: 18, bound: None });
        assert_eq!(
            events[1],
            EngineEvent::PrincipalVariation { rank: 2, moves: vec!["d2d4".into(), "d7d5".into()] }
        );
    }

    #[test]
    fn test_classify_bestmove() {
        assert_eq!(
            classify_line("bestmove e2e4 ponder e7e5").unwrap(),
            vec![EngineEvent::BestMove(Some("e2e4".into()))]
        );
        assert_eq!(classify_line("bestmove (none)").unwrap(), vec![EngineEvent::BestMove(None)]);
        assert!(matches!(classify_line("bestmove"), Err(EngineError::MalformedOutput(_))));
    }

    #[test]
    fn test_classify_other_lines() {
        assert_eq!(classify_line("readyok").unwrap(), vec![EngineEvent::Other]);
        assert_eq!(classify_line("info depth 3 currmove e2e4 currmovenumber 1").unwrap(), vec![EngineEvent::Other]);
        assert_eq!(
            classify_line("info string score cp 100 pv is just text here").unwrap(),
            vec![EngineEvent::Other]
        );
        assert_eq!(classify_line("").unwrap(), vec![EngineEvent::Other]);
    }

    #[test]
    fn test_classify_malformed_score() {
        assert!(matches!(
            classify_line("info depth 5 score cp abc pv e2e4"),
            Err(EngineError::MalformedOutput(_))
        ));
        assert!(matches!(
            classify_line("info depth 5 score"),
            Err(EngineError::MalformedOutput(_))
        ));
    }

    #[tokio::test]
    async fn test_send_command_appends_newline() {
        let (mut channel, mut engine) = channel();
        channel.send_command("isready").await.unwrap();
        drop(channel);

        let mut written = String::new();
        engine.read_to_string(&mut written).await.unwrap();
        assert_eq!(written, "isready\n");
    }

    #[tokio::test]
    async fn test_await_ready_skips_noise() {
        let (mut channel, mut engine) = channel();
        engine
            .write_all(b"Stockfish 16 by the Stockfish developers\nreadyok extra\nreadyok\n")
            .await
            .unwrap();
        channel.await_ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_sends_options_and_reads_name() {
        let (mut channel, engine) = channel();
        let (engine_read, mut engine_write) = split(engine);

        let responder = tokio::spawn(async move {
            let mut lines = BufReader::new(engine_read).lines();
            let mut received = Vec::new();
            while let Some(line) = lines.next_line().await.unwrap() {
                match line.as_str() {
                    "uci" => engine_write
                        .write_all(b"id name Fakefish 1\nid author nobody\noption name Hash type spin\nuciok\n")
                        .await
                        .unwrap(),
                    "isready" => {
                        engine_write.write_all(b"readyok\n").await.unwrap();
                        received.push(line);
                        break;
                    }
                    _ => {}
                }
                received.push(line);
            }
            received
        });

        let options = vec![("MultiPV", "3".to_string()), ("Threads", "2".to_string())];
        let name = channel.handshake(&options).await.unwrap();
        assert_eq!(name, "Fakefish 1");

        let received = responder.await.unwrap();
        assert_eq!(
            received,
            vec![
                "uci",
                "setoption name MultiPV value 3",
                "setoption name Threads value 2",
                "isready",
            ]
        );
    }

    #[tokio::test]
    async fn test_search_stops_at_bestmove() {
        let (mut channel, mut engine) = channel();
        engine
            .write_all(
                b"info depth 1 score cp 20 pv e2e4\n\
                  info depth 2 score cp 31 pv d2d4 d7d5\n\
                  bestmove d2d4 ponder d7d5\n\
                  info depth 1 score cp 99 pv a2a3\n",
            )
            .await
            .unwrap();

        let request = SearchRequest::new("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", 2);
        let mut search = channel.run_search(&request).await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = search.next_event().await.unwrap() {
            events.push(event);
        }
        assert_eq!(events.len(), 5);
        assert_eq!(events[4], EngineEvent::BestMove(Some("d2d4".into())));

        // The line after bestmove belongs to the next search
        assert_eq!(channel.read_line().await.unwrap(), "info depth 1 score cp 99 pv a2a3");
    }

    #[tokio::test]
    async fn test_search_sends_commands_in_order() {
        let (mut channel, engine) = channel();
        let (engine_read, mut engine_write) = split(engine);
        engine_write.write_all(b"bestmove e2e4\n").await.unwrap();

        let request = SearchRequest::new("8/8/8/8/8/8/8/K6k w - - 0 1", 7);
        let evaluation = channel.run_search(&request).await.unwrap().evaluate().await.unwrap();
        assert_eq!(evaluation.best_move, "e2e4");
        assert!(evaluation.score.is_none());
        drop(channel);

        let mut lines = BufReader::new(engine_read).lines();
        let mut sent = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            sent.push(line);
        }
        assert_eq!(
            sent,
            vec!["ucinewgame", "position fen 8/8/8/8/8/8/8/K6k w - - 0 1", "go depth 7"]
        );
    }

    #[tokio::test]
    async fn test_search_skips_malformed_info_line() {
        let (mut channel, mut engine) = channel();
        engine
            .write_all(b"info depth 4 score cp x1 pv e2e4\ninfo depth 5 score cp 12 pv g1f3\nbestmove g1f3\n")
            .await
            .unwrap();

        let request = SearchRequest::new("8/8/8/8/8/8/8/K6k w - - 0 1", 5);
        let evaluation = channel.run_search(&request).await.unwrap().evaluate().await.unwrap();
        assert_eq!(evaluation.score, Some(0.12));
        assert_eq!(evaluation.best_move, "g1f3");
    }

    #[tokio::test]
    async fn test_search_tolerates_non_utf8_output() {
        let (mut channel, mut engine) = channel();
        engine
            .write_all(b"info string net \xff\xfe.nnue\ninfo depth 5 score cp 20 pv e2e4\nbestmove e2e4\n")
            .await
            .unwrap();

        let request = SearchRequest::new("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", 5);
        let evaluation = channel.run_search(&request).await.unwrap().evaluate().await.unwrap();
        assert_eq!(evaluation.score, Some(0.2));
        assert_eq!(evaluation.best_move, "e2e4");
    }

    #[tokio::test]
    async fn test_read_line_replaces_invalid_bytes() {
        let (mut channel, mut engine) = channel();
        engine.write_all(b"id name Fish\xc3\n").await.unwrap();
        assert_eq!(channel.read_line().await.unwrap(), "id name Fish\u{fffd}");
    }

    #[tokio::test]
    async fn test_search_fails_on_bare_bestmove() {
        let (mut channel, mut engine) = channel();
        engine.write_all(b"info depth 5 score cp 12 pv g1f3\nbestmove\n").await.unwrap();

        let request = SearchRequest::new("8/8/8/8/8/8/8/K6k w - - 0 1", 5);
        let result = channel.run_search(&request).await.unwrap().evaluate().await;
        assert!(matches!(result, Err(EngineError::MalformedOutput(_))));
    }

    #[tokio::test]
    async fn test_search_reports_disconnect() {
        let (mut channel, mut engine) = channel();
        engine.write_all(b"info depth 1 score cp 5 pv e2e4\n").await.unwrap();

        let request = SearchRequest::new("8/8/8/8/8/8/8/K6k w - - 0 1", 5);
        let search = channel.run_search(&request).await.unwrap();
        drop(engine);

        let result = search.evaluate().await;
        assert!(matches!(result, Err(EngineError::Disconnected)));
    }
}
