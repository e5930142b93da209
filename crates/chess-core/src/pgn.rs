//! Lightweight regex-based PGN parsing.
//!
//! Only the pieces the replay needs are extracted: the tag pairs, the
//! mainline SAN moves and an optional starting position.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::GameError;
use crate::game_data::{GameData, GameMetadata};

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[(\w+)\s+"([^"]*)"\]"#).expect("header regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("tag regex"));
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]*\}|;[^\n]*").expect("comment regex"));
static VARIATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^()]*\)").expect("variation regex"));
static SAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=[QRBN])?|O-O-O|O-O)[+#]?$")
        .expect("san regex")
});
static MOVE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.+").expect("move number regex"));
static NAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\$\d+$").expect("nag regex"));

const RESULTS: &[&str] = &["1-0", "0-1", "1/2-1/2", "*"];

/// Parse a single-game PGN string into a GameData struct.
///
/// Fails when the text carries no moves at all; legality is checked later
/// when the moves are replayed.
pub fn parse_pgn(pgn: &str) -> Result<GameData, GameError> {
    let mut metadata = GameMetadata {
        white: "Unknown".to_string(),
        black: "Unknown".to_string(),
        result: "*".to_string(),
        ..GameMetadata::default()
    };
    let mut setup = None;
    let mut fen = None;

    for cap in HEADER_RE.captures_iter(pgn) {
        let value = cap[2].to_string();
        match &cap[1] {
            "White" => metadata.white = value,
            "Black" => metadata.black = value,
            "Result" => metadata.result = value,
            "Date" => metadata.date = Some(value),
            "Event" => metadata.event = Some(value),
            "SetUp" => setup = Some(value),
            "FEN" => fen = Some(value),
            _ => {}
        }
    }

    // A FEN tag without SetUp "1" is still honoured; some exporters omit it
    let start_fen = match (setup.as_deref(), fen) {
        (Some("0"), _) => None,
        (_, fen) => fen,
    };

    let moves = extract_moves(pgn)?;
    if moves.is_empty() {
        return Err(GameError::NoMoves);
    }

    Ok(GameData {
        metadata,
        moves,
        start_fen,
    })
}

/// Extract SAN moves from PGN text (after removing headers, comments, variations).
///
/// Move numbers, NAGs, `!`/`?` glyphs and result tokens are skipped; any other
/// token that is not a complete SAN move rejects the whole game.
pub fn extract_moves(pgn: &str) -> Result<Vec<String>, GameError> {
    let no_headers = TAG_RE.replace_all(pgn, "");
    let mut text = COMMENT_RE.replace_all(&no_headers, "").into_owned();

    // Innermost variations first until nested ones are gone
    loop {
        let stripped = VARIATION_RE.replace_all(&text, "").into_owned();
        if stripped == text {
            break;
        }
        text = stripped;
    }

    let mut moves = Vec::new();
    for token in text.split_whitespace() {
        if RESULTS.contains(&token) || NAG_RE.is_match(token) {
            continue;
        }
        // `12.` and `12...` stand alone, but `1.e4` carries its move
        let rest = MOVE_NUMBER_RE.replace(token, "");
        let san = rest.trim_end_matches(['!', '?']);
        if san.is_empty() {
            if rest.is_empty() {
                continue;
            }
        } else if SAN_RE.is_match(san) {
            moves.push(san.to_string());
            continue;
        }
        return Err(GameError::InvalidToken {
            ply: moves.len(),
            token: token.to_string(),
        });
    }
    Ok(moves)
}

/// Split a multi-game PGN file on `[Event` boundaries.
/// Text before the first `[Event` tag is ignored.
pub fn split_games(text: &str) -> Vec<&str> {
    // `[EventDate ...]` and friends are not game boundaries
    let starts: Vec<usize> = text
        .match_indices("[Event")
        .filter(|(i, tag)| {
            !text[i + tag.len()..]
                .starts_with(|c: char| c.is_alphanumeric() || c == '_')
        })
        .map(|(i, _)| i)
        .collect();
    if starts.is_empty() {
        return if text.trim().is_empty() {
            Vec::new()
        } else {
            vec![text]
        };
    }

    starts
        .iter()
        .enumerate()
        .map(|(n, &start)| {
            let end = starts.get(n + 1).copied().unwrap_or(text.len());
            &text[start..end]
        })
        .collect()
}

/// Pick the `index`-th game (1-based) out of a multi-game PGN file.
pub fn select_game(text: &str, index: usize) -> Result<&str, GameError> {
    let games = split_games(text);
    if index == 0 || index > games.len() {
        return Err(GameError::GameIndex {
            index,
            available: games.len(),
        });
    }
    Ok(games[index - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pgn_basic() {
        let pgn = r#"[White "Player1"]
[Black "Player2"]
[Result "1-0"]
[Date "2025.01.15"]

1. e4 e5 2. Nf3 Nc6 1-0"#;

        let game = parse_pgn(pgn).unwrap();
        assert_eq!(game.metadata.white, "Player1");
        assert_eq!(game.metadata.black, "Player2");
        assert_eq!(game.metadata.result, "1-0");
        assert_eq!(game.moves, vec!["e4", "e5", "Nf3", "Nc6"]);
        assert!(game.start_fen.is_none());
    }

    #[test]
    fn test_comments_and_nested_variations_are_skipped() {
        let pgn = "1. e4 {best by test} e5 (1... c5 2. Nf3 (2. c3 d5) d6) 2. Nf3 ; trap\n2... Nc6 *";
        assert_eq!(extract_moves(pgn).unwrap(), vec!["e4", "e5", "Nf3", "Nc6"]);
    }

    #[test]
    fn test_castling_and_promotion_tokens() {
        let pgn = "1. O-O-O+ O-O 2. exd8=Q# *";
        assert_eq!(extract_moves(pgn).unwrap(), vec!["O-O-O+", "O-O", "exd8=Q#"]);
    }

    #[test]
    fn test_numbers_glyphs_and_nags_are_skipped() {
        let pgn = "1.e4! e5?! 2. Nf3 $1 Nc6 3.Bb5!! 3... a6 1/2-1/2";
        assert_eq!(
            extract_moves(pgn).unwrap(),
            vec!["e4", "e5", "Nf3", "Nc6", "Bb5", "a6"]
        );
    }

    #[test]
    fn test_unrecognised_token_rejects_game() {
        for (pgn, bad, ply) in [
            ("1. e4 e5 2. Nf3 Qx9 *", "Qx9", 3),
            ("1. e4 e5 2. Nf", "Nf", 2),
            ("1. e4 e5 2. Nf3 hello Nc6 *", "hello", 3),
            ("1. e4 {cut off", "{cut", 1),
        ] {
            match parse_pgn(pgn) {
                Err(GameError::InvalidToken { ply: at, token }) => {
                    assert_eq!(token, bad, "{pgn}");
                    assert_eq!(at, ply, "{pgn}");
                }
                other => panic!("{pgn}: expected InvalidToken, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_pgn_without_moves_fails() {
        let pgn = r#"[White "A"]
[Black "B"]

*"#;
        assert!(matches!(parse_pgn(pgn), Err(GameError::NoMoves)));
    }

    #[test]
    fn test_fen_header_is_start_position() {
        let pgn = r#"[SetUp "1"]
[FEN "4k3/8/8/8/8/8/4P3/4K3 w - - 0 1"]

1. e4 *"#;
        let game = parse_pgn(pgn).unwrap();
        assert_eq!(
            game.start_fen.as_deref(),
            Some("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1")
        );
    }

    #[test]
    fn test_split_and_select_games() {
        let text = "junk\n[Event \"one\"]\n1. e4 *\n\n[Event \"two\"]\n1. d4 *\n";
        let games = split_games(text);
        assert_eq!(games.len(), 2);
        assert!(games[1].contains("d4"));

        assert!(select_game(text, 1).unwrap().contains("e4"));
        assert!(matches!(
            select_game(text, 3),
            Err(GameError::GameIndex { index: 3, available: 2 })
        ));
    }

    #[test]
    fn test_bare_movetext_is_one_game() {
        assert_eq!(split_games("1. e4 e5").len(), 1);
        assert!(split_games("  \n").is_empty());
    }

    #[test]
    fn test_event_date_is_not_a_boundary() {
        let text = "[Event\t\"one\"]\n[EventDate \"2024.01.01\"]\n1. e4 *\n[Event \"two\"]\n1. d4 *";
        let games = split_games(text);
        assert_eq!(games.len(), 2);
        assert!(games[0].contains("EventDate"));
        assert!(games[0].contains("e4"));
    }
}
