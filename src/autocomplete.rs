// パス: src/autocomplete.rs
// 役割: 省略されたコマンド名・オプション名を候補一覧から一意に解決する
// 意図: 候補が増えても省略形が別の候補を黙って選ばないよう、曖昧さを明示的に返す
// 関連ファイル: src/repl/cmd.rs, src/repl/commands.rs, src/evaluator/memory.rs

/// 補完の結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    /// 一意に決まった候補の添字。
    Found(usize),
    NotFound,
    /// 2 つ以上の候補が前方一致した。
    Ambiguous,
}

impl Match {
    pub fn found(self) -> Option<usize> {
        match self {
            Match::Found(index) => Some(index),
            _ => None,
        }
    }
}

/// `text` を小文字化した文字列が前方一致する候補を探す。
///
/// 候補は小文字で与える。
pub fn autocomplete(text: &str, candidates: &[&str]) -> Match {
    if text.is_empty() {
        return Match::NotFound;
    }
    let folded = text.to_ascii_lowercase();
    let mut matches = candidates
        .iter()
        .enumerate()
        .filter(|(_, candidate)| candidate.starts_with(&folded))
        .map(|(index, _)| index);
    match (matches.next(), matches.next()) {
        (Some(index), None) => Match::Found(index),
        (Some(_), Some(_)) => Match::Ambiguous,
        (None, _) => Match::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 一意・曖昧・該当なしの 3 通りを区別する。
    fn distinguishes_unique_ambiguous_and_missing() {
        assert_eq!(autocomplete("mat", &["match", "nomatch", "mismatch"]), Match::Found(0));
        assert_eq!(autocomplete("m", &["match", "nomatch", "mismatch"]), Match::Ambiguous);
        assert_eq!(autocomplete("x", &["match", "nomatch", "mismatch"]), Match::NotFound);
        assert_eq!(autocomplete("", &["match"]), Match::NotFound);
    }

    #[test]
    /// 大文字小文字を区別しない。
    fn folds_case() {
        assert_eq!(autocomplete("MAT", &["match", "nomatch"]), Match::Found(0));
        assert_eq!(autocomplete("NoM", &["match", "nomatch"]), Match::Found(1));
    }

    #[test]
    /// 候補自身が別の候補の接頭辞でも、一致が複数なら曖昧とする。
    fn full_name_can_still_be_ambiguous() {
        assert_eq!(autocomplete("mat", &["mat", "matter"]), Match::Ambiguous);
        let types = ["char", "uchar", "short", "ushort", "int", "uint", "half", "float"];
        assert_eq!(autocomplete("int", &types), Match::Found(4));
        assert_eq!(autocomplete("u", &types), Match::Ambiguous);
        assert_eq!(autocomplete("us", &types), Match::Found(3));
        assert_eq!(autocomplete("ui", &types).found(), Some(5));
    }
}
