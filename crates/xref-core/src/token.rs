//! Token stream types.
//!
//! A token is an immutable, typed fragment of source text. Tokens are owned by
//! their [`ParsedFile`](crate::parsed_file::ParsedFile) and addressed by their
//! dense 0-based `index`; nothing outside the file holds a reference to one.

use serde::{Deserialize, Serialize};

/// Lexical category of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Whitespace,
    Comment,
    DocComment,
    /// Text outside of `<?php ... ?>` blocks.
    InlineHtml,
    OpenTag,
    OpenTagWithEcho,
    CloseTag,
    /// `$name`, including the leading `$`.
    Variable,
    /// Identifier that is not a reserved word (or a reserved word used as a
    /// member name after `->` / `::`).
    Name,
    /// Reserved word; compared case-insensitively.
    Keyword,
    /// The `\` namespace separator.
    NsSeparator,
    Number,
    /// Single-quoted, double-quoted or backtick string, kept whole.
    String,
    /// Heredoc or nowdoc, including its closing label.
    Heredoc,
    /// `(int)`, `(string)` and friends.
    Cast,
    /// Multi-character operator such as `===`, `->`, `::`, `??=`.
    Operator,
    /// Single-character punctuation, brackets included.
    Punct,
}

/// One token of a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// 1-based line on which the token starts.
    pub line_number: u32,
    /// Position in the owning file's token array.
    pub index: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line_number: u32, index: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            line_number,
            index,
        }
    }

    /// Whitespace and comments carry no syntax.
    pub fn is_space(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Whitespace | TokenKind::Comment | TokenKind::DocComment
        )
    }

    /// Exact text match for punctuation and operators.
    pub fn is(&self, text: &str) -> bool {
        matches!(self.kind, TokenKind::Punct | TokenKind::Operator) && self.text == text
    }

    /// Case-insensitive reserved-word match.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text.eq_ignore_ascii_case(keyword)
    }

    /// Reserved word or plain identifier, compared case-insensitively.
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self.kind, TokenKind::Keyword | TokenKind::Name)
            && self.text.eq_ignore_ascii_case(word)
    }

    pub fn is_open_bracket(&self) -> bool {
        self.kind == TokenKind::Punct && matches!(self.text.as_str(), "(" | "[" | "{")
    }

    pub fn is_close_bracket(&self) -> bool {
        self.kind == TokenKind::Punct && matches!(self.text.as_str(), ")" | "]" | "}")
    }

    /// Statement terminator: `;` or a `?>` close tag.
    pub fn is_terminator(&self) -> bool {
        self.is(";") || self.kind == TokenKind::CloseTag
    }
}

/// The closing bracket text matching an opening one.
pub fn closing_bracket(open: &str) -> Option<&'static str> {
    match open {
        "(" => Some(")"),
        "[" => Some("]"),
        "{" => Some("}"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_kinds() {
        assert!(Token::new(TokenKind::Whitespace, " ", 1, 0).is_space());
        assert!(Token::new(TokenKind::Comment, "// x", 1, 0).is_space());
        assert!(Token::new(TokenKind::DocComment, "/** x */", 1, 0).is_space());
        assert!(!Token::new(TokenKind::Punct, ";", 1, 0).is_space());
    }

    #[test]
    fn keyword_match_ignores_case() {
        let t = Token::new(TokenKind::Keyword, "FUNCTION", 1, 0);
        assert!(t.is_keyword("function"));
        assert!(!Token::new(TokenKind::Name, "function", 1, 0).is_keyword("function"));
        assert!(Token::new(TokenKind::Name, "Parent", 1, 0).is_word("parent"));
    }

    #[test]
    fn brackets() {
        let open = Token::new(TokenKind::Punct, "{", 1, 0);
        assert!(open.is_open_bracket());
        assert!(!open.is_close_bracket());
        assert_eq!(closing_bracket("("), Some(")"));
        assert_eq!(closing_bracket(";"), None);
        // a string that happens to contain a bracket is not one
        assert!(!Token::new(TokenKind::String, "(", 1, 0).is_open_bracket());
    }
}
