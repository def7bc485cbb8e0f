//! Fuzzy subsequence scoring with case and word-boundary awareness.
//!
//! The matcher scores a query pattern against a candidate string, rewarding
//! matches that land on camelCase / snake_case segment heads and penalizing
//! matches buried in the middle of a word run. Scores are only meaningful
//! relative to each other: callers rank candidates by score and treat
//! anything at or below [`FuzzyMatcher::MIN_SCORE`] as a non-match.

/// Character class used for boundary detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Other,
    Lower,
    Upper,
}

/// The role a character plays inside its word.
///
/// `Head` starts a camel-case or snake-case segment, `Tail` continues one,
/// `None` is a separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharRole {
    None,
    Tail,
    Head,
}

fn char_class(c: u8) -> CharClass {
    if c.is_ascii_lowercase() {
        CharClass::Lower
    } else if c.is_ascii_uppercase() {
        CharClass::Upper
    } else {
        CharClass::Other
    }
}

/// Bit set over `CharClass` recording which classes appear in a string.
type ClassSet = u8;

fn class_bit(class: CharClass) -> ClassSet {
    1 << class as u8
}

/// Computes per-character roles. `U(U)L` is a `Head` while `U(U)U` is a
/// `Tail`, so the `C` in `CamelCase` and the `F` in `INT_FAST16` both start
/// segments.
fn calculate_roles(s: &[u8], roles: &mut Vec<CharRole>) -> ClassSet {
    roles.clear();
    if s.is_empty() {
        return 0;
    }

    let mut class_set = class_bit(char_class(s[0]));
    let mut pre = CharClass::Other;
    let mut cur = char_class(s[0]);

    let role = |pre: CharClass, cur: CharClass, suc: CharClass| {
        if cur == CharClass::Other {
            return CharRole::None;
        }
        if pre == CharClass::Other
            || (cur == CharClass::Upper && (pre == CharClass::Lower || suc != CharClass::Upper))
        {
            CharRole::Head
        } else {
            CharRole::Tail
        }
    };

    for i in 0..s.len() - 1 {
        let suc = char_class(s[i + 1]);
        class_set |= class_bit(suc);
        roles.push(role(pre, cur, suc));
        pre = cur;
        cur = suc;
    }
    // The last character has no successor; it only starts a segment when its
    // predecessor ends one (an `UPPER` run keeps its trailing char as Tail).
    roles.push(role(pre, cur, cur));
    class_set
}

/// Reusable scorer for one pattern against many candidates.
pub struct FuzzyMatcher {
    pat: Vec<u8>,
    low_pat: Vec<u8>,
    pat_role: Vec<CharRole>,
    pat_set: ClassSet,
    text_role: Vec<CharRole>,
    low_text: Vec<u8>,
    dp: [Vec<[i32; 2]>; 2],
}

impl FuzzyMatcher {
    pub const MAX_PATTERN: usize = 100;
    pub const MAX_TEXT: usize = 200;
    /// Negative but far from `i32::MIN` so intermediate sums cannot overflow.
    pub const MIN_SCORE: i32 = i32::MIN / 4;

    /// Builds a matcher for `pattern`. Spaces in the pattern are stripped but
    /// still contribute word-boundary information to their neighbors.
    pub fn new(pattern: &str) -> FuzzyMatcher {
        let bytes: Vec<u8> = pattern.bytes().take(Self::MAX_PATTERN).collect();
        let mut full_roles = Vec::new();
        let pat_set = calculate_roles(&bytes, &mut full_roles);

        let mut pat = Vec::with_capacity(bytes.len());
        let mut low_pat = Vec::with_capacity(bytes.len());
        let mut pat_role = Vec::with_capacity(bytes.len());
        for (i, &b) in bytes.iter().enumerate() {
            if b != b' ' {
                pat.push(b);
                low_pat.push(b.to_ascii_lowercase());
                pat_role.push(full_roles[i]);
            }
        }

        FuzzyMatcher {
            pat,
            low_pat,
            pat_role,
            pat_set,
            text_role: Vec::new(),
            low_text: Vec::new(),
            dp: [Vec::new(), Vec::new()],
        }
    }

    /// Scores `text` against the pattern. Higher is better; a result at or
    /// below [`Self::MIN_SCORE`] means "no acceptable match". Texts longer
    /// than [`Self::MAX_TEXT`] are skipped with the sentinel
    /// `MIN_SCORE + 1` so callers can drop them without ranking them above
    /// genuine rejections.
    pub fn match_score(&mut self, text: &str) -> i32 {
        let text = text.as_bytes();
        let n = text.len();
        if n > Self::MAX_TEXT {
            return Self::MIN_SCORE + 1;
        }

        self.low_text.clear();
        self.low_text.extend(text.iter().map(|b| b.to_ascii_lowercase()));
        calculate_roles(text, &mut self.text_role);

        // Rows cover both index spaces: the miss chain runs to n, and row
        // initialization touches index i for every pattern position.
        let row_len = (n + 1).max(self.pat.len() + 1);
        for row in &mut self.dp {
            row.clear();
            row.resize(row_len, [Self::MIN_SCORE * 2; 2]);
        }

        // Base row: consuming no pattern, only misses.
        self.dp[0][0] = [0, 0];
        for j in 0..n {
            self.dp[0][j + 1][0] = self.dp[0][j][0] + miss_score_at(&self.text_role, j, false);
            self.dp[0][j + 1][1] = Self::MIN_SCORE * 2;
        }

        for i in 0..self.pat.len() {
            let (pre_row, cur_row) = {
                let (a, b) = self.dp.split_at_mut(1);
                if i & 1 == 0 {
                    (&mut a[0], &mut b[0])
                } else {
                    (&mut b[0], &mut a[0])
                }
            };
            cur_row[i] = [Self::MIN_SCORE, Self::MIN_SCORE];
            for j in i..n {
                cur_row[j + 1][0] = std::cmp::max(
                    cur_row[j][0] + miss_score_at(&self.text_role, j, false),
                    cur_row[j][1] + miss_score_at(&self.text_role, j, true),
                );
                // The first pattern char may not land mid-run on a case
                // mismatch; this filters e.g. `int` inside `PRINT`.
                if self.low_pat[i] == self.low_text[j]
                    && (i != 0 || self.text_role[j] != CharRole::Tail || self.pat[i] == text[j])
                {
                    let bonus = |last| {
                        match_bonus(
                            &self.pat,
                            &self.pat_role,
                            self.pat_set,
                            text,
                            &self.text_role,
                            i,
                            j,
                            last,
                        )
                    };
                    cur_row[j + 1][1] = std::cmp::max(
                        pre_row[j][0] + bonus(false),
                        pre_row[j][1] + bonus(true),
                    );
                } else {
                    cur_row[j + 1][1] = Self::MIN_SCORE * 2;
                }
            }
        }

        // Enumerate match end positions; each trimmed trailing character
        // costs 3.
        let last_row = &self.dp[self.pat.len() & 1];
        let mut best = Self::MIN_SCORE;
        for j in self.pat.len()..=n {
            best = std::cmp::max(best, last_row[j][1] - 3 * (n - j) as i32);
        }
        best
    }

}

#[allow(clippy::too_many_arguments)]
fn match_bonus(
    pat: &[u8],
    pat_role: &[CharRole],
    pat_set: ClassSet,
    text: &[u8],
    text_role: &[CharRole],
    i: usize,
    j: usize,
    last: bool,
) -> i32 {
    let mut s = 0;
    if pat[i] == text[j] {
        s += 1;
        if pat_set & class_bit(CharClass::Upper) != 0 || i == j {
            s += 1;
        }
    }
    if pat_role[i] == CharRole::Head {
        match text_role[j] {
            CharRole::Head => s += 30,
            CharRole::Tail => s -= 10,
            CharRole::None => {}
        }
    }
    if text_role[j] == CharRole::Tail && i > 0 && !last {
        s -= 30;
    }
    if i == 0 && text_role[j] == CharRole::Tail {
        s -= 40;
    }
    s
}

fn miss_score_at(text_role: &[CharRole], j: usize, last: bool) -> i32 {
    let mut s = if last { -10 } else { 0 };
    if text_role[j] == CharRole::Head {
        s -= 10;
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Asserts that `texts` rank in non-increasing score order for `pat`.
    fn ranks(pat: &str, texts: &[&str]) {
        let mut matcher = FuzzyMatcher::new(pat);
        let scores: Vec<i32> = texts.iter().map(|t| matcher.match_score(t)).collect();
        for window in scores.windows(2) {
            assert!(
                window[0] >= window[1],
                "pattern {pat:?}: expected non-increasing scores, got {texts:?} -> {scores:?}"
            );
        }
    }

    #[test]
    fn empty_pattern() {
        let mut matcher = FuzzyMatcher::new("");
        assert_eq!(matcher.match_score(""), 0);
        assert!(matcher.match_score("aaa") < 0);
    }

    #[test]
    fn prefers_exact_case() {
        ranks("monad", &["monad", "Monad", "mONAD"]);
    }

    #[test]
    fn prefers_initials() {
        ranks("ab", &["ab", "aoo_boo", "acb"]);
        ranks("CC", &["CamelCase", "camelCase", "camelcase"]);
        ranks("cC", &["camelCase", "CamelCase", "camelcase"]);
        ranks(
            "c c",
            &["camel case", "camelCase", "CamelCase", "camelcase", "camel ace"],
        );
        ranks("Da.Te", &["Data.Text", "Data.Text.Lazy", "Data.Aeson.Encoding.text"]);
        ranks("foo bar.h", &["foo/bar.h", "foobar.h"]);
    }

    #[test]
    fn prefers_prefix() {
        ranks("is", &["isIEEE", "inSuf"]);
    }

    #[test]
    fn prefers_shorter() {
        ranks("ma", &["map", "many", "maximum"]);
        ranks("print", &["printf", "sprintf"]);
    }

    #[test]
    fn rejects_mid_word_case_mismatch() {
        // The lowercase pattern must not match inside an all-caps run.
        ranks("ast", &["ast", "AST", "INT_FAST16_MAX"]);
        let mut matcher = FuzzyMatcher::new("ast");
        assert!(matcher.match_score("INT_FAST16_MAX") <= FuzzyMatcher::MIN_SCORE);

        // With an uppercase head the mid-word match is allowed, just ranked
        // below real word starts.
        ranks("Int", &["int", "INT", "PRINT"]);
        let mut matcher = FuzzyMatcher::new("Int");
        assert!(matcher.match_score("PRINT") > FuzzyMatcher::MIN_SCORE);
    }

    #[test]
    fn pattern_longer_than_text_is_rejected() {
        let mut matcher = FuzzyMatcher::new("abcdef");
        assert!(matcher.match_score("abc") <= FuzzyMatcher::MIN_SCORE);
        assert!(matcher.match_score("") <= FuzzyMatcher::MIN_SCORE);
    }

    #[test]
    fn oversized_text_is_skipped_not_rejected() {
        let long = "x".repeat(FuzzyMatcher::MAX_TEXT + 1);
        let mut matcher = FuzzyMatcher::new("x");
        assert_eq!(matcher.match_score(&long), FuzzyMatcher::MIN_SCORE + 1);
    }
}
