//! PHP tokenizer.
//!
//! Produces the flat token stream consumed by the model builder. Everything
//! outside `<?php ... ?>` is a single [`TokenKind::InlineHtml`] token; inside
//! PHP mode strings, heredocs and comments are kept whole so that downstream
//! code never sees their contents as syntax.

use memchr::{memchr, memmem};
use thiserror::Error;

use xref_core::error::ParseError;
use xref_core::token::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("invalid UTF-8 sequence at byte {offset}")]
    InvalidUtf8 { offset: usize, line: u32 },

    #[error("unterminated {what} starting on line {line}")]
    Unterminated {
        what: &'static str,
        offset: usize,
        line: u32,
    },

    #[error("unexpected character {ch:?} on line {line}")]
    UnexpectedChar { ch: char, offset: usize, line: u32 },
}

impl LexError {
    pub fn line(&self) -> u32 {
        match self {
            LexError::InvalidUtf8 { line, .. }
            | LexError::Unterminated { line, .. }
            | LexError::UnexpectedChar { line, .. } => *line,
        }
    }

    pub fn offset(&self) -> usize {
        match self {
            LexError::InvalidUtf8 { offset, .. }
            | LexError::Unterminated { offset, .. }
            | LexError::UnexpectedChar { offset, .. } => *offset,
        }
    }
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError::new(e.to_string(), e.line()).with_offset(e.offset())
    }
}

const KEYWORDS: &[&str] = &[
    "abstract", "and", "array", "as", "break", "callable", "case", "catch", "class", "clone",
    "const", "continue", "declare", "default", "do", "echo", "else", "elseif", "empty",
    "enddeclare", "endfor", "endforeach", "endif", "endswitch", "endwhile", "extends", "final",
    "finally", "fn", "for", "foreach", "function", "global", "goto", "if", "implements",
    "include", "include_once", "instanceof", "insteadof", "interface", "isset", "list", "match",
    "namespace", "new", "or", "print", "private", "protected", "public", "readonly", "require",
    "require_once", "return", "static", "switch", "throw", "trait", "try", "unset", "use", "var",
    "while", "xor", "yield",
];

const CASTS: &[&str] = &[
    "int", "integer", "bool", "boolean", "float", "double", "real", "string", "binary", "array",
    "object", "unset",
];

/// Multi-character operators, longest first within each shared prefix.
const OPERATORS: &[&str] = &[
    "<=>", "**=", "...", "<<=", ">>=", "===", "!==", "??=", "?->", "++", "--", "->", "=>", "::",
    "==", "!=", "<>", "<=", ">=", "&&", "||", "??", "+=", "-=", "*=", "/=", ".=", "%=", "&=",
    "|=", "^=", "<<", ">>", "**",
];

const PUNCT: &[u8] = b";,(){}[]=+-*/%.<>!?:&|^~@$#";

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

/// Tokenize a whole file.
pub fn tokenize(source: &[u8]) -> Result<Vec<Token>, LexError> {
    let text = std::str::from_utf8(source).map_err(|e| {
        let offset = e.valid_up_to();
        LexError::InvalidUtf8 {
            offset,
            line: line_of(source, offset),
        }
    })?;
    Lexer::new(text).run()
}

fn line_of(source: &[u8], offset: usize) -> u32 {
    1 + source[..offset.min(source.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count() as u32
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_ident_char(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

struct Lexer<'s> {
    src: &'s str,
    bytes: &'s [u8],
    pos: usize,
    line: u32,
    tokens: Vec<Token>,
}

impl<'s> Lexer<'s> {
    fn new(src: &'s str) -> Self {
        Lexer {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        while self.pos < self.bytes.len() {
            self.inline_html();
            while self.pos < self.bytes.len() {
                if self.php_token()? {
                    break;
                }
            }
        }
        Ok(self.tokens)
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn rest(&self) -> &'s [u8] {
        &self.bytes[self.pos..]
    }

    fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s.as_bytes())
    }

    /// Emit `src[pos..end]` and advance.
    fn emit(&mut self, kind: TokenKind, end: usize) {
        let text = &self.src[self.pos..end];
        let index = self.tokens.len();
        self.tokens.push(Token::new(kind, text, self.line, index));
        self.line += text.matches('\n').count() as u32;
        self.pos = end;
    }

    fn unterminated(&self, what: &'static str) -> LexError {
        LexError::Unterminated {
            what,
            offset: self.pos,
            line: self.line,
        }
    }

    // ------------------------------------------------------------------------
    // HTML mode
    // ------------------------------------------------------------------------

    fn inline_html(&mut self) {
        let mut search = self.pos;
        let open = loop {
            match memmem::find(&self.bytes[search..], b"<?") {
                Some(rel) => {
                    let at = search + rel;
                    if let Some(len) = self.open_tag_len(at) {
                        break Some((at, len));
                    }
                    search = at + 2;
                }
                None => break None,
            }
        };

        let (at, len) = match open {
            Some(found) => found,
            None => {
                self.emit(TokenKind::InlineHtml, self.bytes.len());
                return;
            }
        };
        if at > self.pos {
            self.emit(TokenKind::InlineHtml, at);
        }
        let kind = if self.bytes[at + 2] == b'=' {
            TokenKind::OpenTagWithEcho
        } else {
            TokenKind::OpenTag
        };
        self.emit(kind, at + len);
    }

    /// Length of the open tag at `at`, including the one whitespace character
    /// that belongs to `<?php`.
    fn open_tag_len(&self, at: usize) -> Option<usize> {
        let after = &self.bytes[at + 2..];
        if after.first() == Some(&b'=') {
            return Some(3);
        }
        if after.len() >= 3 && after[..3].eq_ignore_ascii_case(b"php") {
            return match after.get(3) {
                None => Some(5),
                Some(b'\r') if after.get(4) == Some(&b'\n') => Some(7),
                Some(b' ' | b'\t' | b'\n' | b'\r') => Some(6),
                Some(_) => None,
            };
        }
        None
    }

    // ------------------------------------------------------------------------
    // PHP mode
    // ------------------------------------------------------------------------

    /// Lex one token. Returns `true` when a close tag switched back to HTML.
    fn php_token(&mut self) -> Result<bool, LexError> {
        let b = self.bytes[self.pos];

        if b.is_ascii_whitespace() {
            let len = self
                .rest()
                .iter()
                .position(|c| !c.is_ascii_whitespace())
                .unwrap_or(self.rest().len());
            self.emit(TokenKind::Whitespace, self.pos + len);
            return Ok(false);
        }

        if self.starts_with("?>") {
            let mut end = self.pos + 2;
            if self.bytes[end..].starts_with(b"\r\n") {
                end += 2;
            } else if self.bytes.get(end) == Some(&b'\n') {
                end += 1;
            }
            self.emit(TokenKind::CloseTag, end);
            return Ok(true);
        }

        match b {
            b'#' if self.peek(1) == Some(b'[') => self.emit(TokenKind::Punct, self.pos + 1),
            b'#' => self.line_comment(),
            b'/' if self.peek(1) == Some(b'/') => self.line_comment(),
            b'/' if self.peek(1) == Some(b'*') => self.block_comment()?,
            b'$' if self.peek(1).is_some_and(is_ident_start) => {
                let end = self.ident_end(self.pos + 1);
                self.emit(TokenKind::Variable, end);
            }
            b'\\' => self.emit(TokenKind::NsSeparator, self.pos + 1),
            b'\'' => {
                let end = self.single_quoted(self.pos)?;
                self.emit(TokenKind::String, end);
            }
            b'"' | b'`' => {
                let end = self.double_quoted(self.pos, b)?;
                self.emit(TokenKind::String, end);
            }
            b'<' if self.starts_with("<<<") => self.heredoc()?,
            b'(' if self.cast_len().is_some() => {
                let len = self.cast_len().unwrap_or(1);
                self.emit(TokenKind::Cast, self.pos + len);
            }
            b'0'..=b'9' => self.number(),
            b'.' if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => self.number(),
            _ if is_ident_start(b) => self.word(),
            _ => self.operator()?,
        }
        Ok(false)
    }

    fn ident_end(&self, from: usize) -> usize {
        from + self.bytes[from..]
            .iter()
            .position(|&c| !is_ident_char(c))
            .unwrap_or(self.bytes.len() - from)
    }

    fn word(&mut self) {
        let end = self.ident_end(self.pos);
        let text = &self.src[self.pos..end];
        let kind = if is_keyword(text) && !self.after_member_access() {
            TokenKind::Keyword
        } else {
            TokenKind::Name
        };
        self.emit(kind, end);
    }

    /// Reserved words directly after `->`, `?->`, `::`, `function` or `const`
    /// are plain member names.
    fn after_member_access(&self) -> bool {
        self.tokens.iter().rev().find(|t| !t.is_space()).is_some_and(|prev| {
            prev.is("->")
                || prev.is("?->")
                || prev.is("::")
                || prev.is_keyword("function")
                || prev.is_keyword("const")
        })
    }

    /// Line comments end before a newline's successor or before `?>`.
    fn line_comment(&mut self) {
        let rest = self.rest();
        let mut end = rest.len();
        let mut i = 0;
        while i < rest.len() {
            match rest[i] {
                b'\n' => {
                    end = i + 1;
                    break;
                }
                b'?' if rest.get(i + 1) == Some(&b'>') => {
                    end = i;
                    break;
                }
                _ => i += 1,
            }
        }
        self.emit(TokenKind::Comment, self.pos + end);
    }

    fn block_comment(&mut self) -> Result<(), LexError> {
        let rest = self.rest();
        let close = memmem::find(&rest[2..], b"*/").ok_or_else(|| self.unterminated("comment"))?;
        let end = self.pos + 2 + close + 2;
        let is_doc = rest.starts_with(b"/**") && rest.get(3).is_some_and(|c| c.is_ascii_whitespace());
        let kind = if is_doc {
            TokenKind::DocComment
        } else {
            TokenKind::Comment
        };
        self.emit(kind, end);
        Ok(())
    }

    fn single_quoted(&self, start: usize) -> Result<usize, LexError> {
        let mut i = start + 1;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\\' => i += 2,
                b'\'' => return Ok(i + 1),
                _ => i += 1,
            }
        }
        Err(self.unterminated("string"))
    }

    /// End of a `"..."` or backtick string starting at `start`. Complex
    /// interpolations (`{$a["k"]}`) may contain nested quotes.
    fn double_quoted(&self, start: usize, quote: u8) -> Result<usize, LexError> {
        let mut i = start + 1;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\\' => i += 2,
                c if c == quote => return Ok(i + 1),
                b'{' if self.bytes.get(i + 1) == Some(&b'$') => i = self.interpolation(i)?,
                b'$' if self.bytes.get(i + 1) == Some(&b'{') => i = self.interpolation(i + 1)?,
                _ => i += 1,
            }
        }
        Err(self.unterminated("string"))
    }

    /// Skip a braced interpolation whose `{` is at `open`.
    fn interpolation(&self, open: usize) -> Result<usize, LexError> {
        let mut depth = 0usize;
        let mut i = open;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(i + 1);
                    }
                }
                b'\'' => {
                    i = self.single_quoted(i)?;
                    continue;
                }
                b'"' => {
                    i = self.double_quoted(i, b'"')?;
                    continue;
                }
                _ => {}
            }
            i += 1;
        }
        Err(self.unterminated("string interpolation"))
    }

    /// `<<<LABEL`, `<<<"LABEL"` or `<<<'LABEL'` up to and including the
    /// closing label, which may be indented.
    fn heredoc(&mut self) -> Result<(), LexError> {
        let mut i = self.pos + 3;
        while matches!(self.bytes.get(i), Some(b' ' | b'\t')) {
            i += 1;
        }
        let quote = match self.bytes.get(i) {
            Some(&q @ (b'"' | b'\'')) => {
                i += 1;
                Some(q)
            }
            _ => None,
        };
        if !self.bytes.get(i).copied().is_some_and(is_ident_start) {
            // `<<<` not followed by a label: treat as `<<` then `<`.
            self.emit(TokenKind::Operator, self.pos + 2);
            return Ok(());
        }
        let label_end = self.ident_end(i);
        let label = &self.bytes[i..label_end];
        i = label_end;
        if let Some(q) = quote {
            if self.bytes.get(i) != Some(&q) {
                return Err(self.unterminated("heredoc label"));
            }
            i += 1;
        }

        let mut line_start = match memchr(b'\n', &self.bytes[i..]) {
            Some(nl) => i + nl + 1,
            None => return Err(self.unterminated("heredoc")),
        };
        loop {
            let mut j = line_start;
            while matches!(self.bytes.get(j), Some(b' ' | b'\t')) {
                j += 1;
            }
            if self.bytes[j..].starts_with(label)
                && !self.bytes.get(j + label.len()).copied().is_some_and(is_ident_char)
            {
                self.emit(TokenKind::Heredoc, j + label.len());
                return Ok(());
            }
            match memchr(b'\n', &self.bytes[line_start..]) {
                Some(nl) => line_start += nl + 1,
                None => return Err(self.unterminated("heredoc")),
            }
        }
    }

    /// Length of a cast such as `( int )` at the current position.
    fn cast_len(&self) -> Option<usize> {
        let rest = self.rest();
        let mut i = 1;
        while matches!(rest.get(i), Some(b' ' | b'\t')) {
            i += 1;
        }
        let word_start = i;
        while rest.get(i).is_some_and(|c| c.is_ascii_alphabetic()) {
            i += 1;
        }
        let word = &rest[word_start..i];
        if word.is_empty() || !CASTS.iter().any(|c| c.as_bytes().eq_ignore_ascii_case(word)) {
            return None;
        }
        while matches!(rest.get(i), Some(b' ' | b'\t')) {
            i += 1;
        }
        (rest.get(i) == Some(&b')')).then_some(i + 1)
    }

    fn number(&mut self) {
        let rest = self.rest();
        let mut i = 0;
        let radix_prefix = rest.len() > 2
            && rest[0] == b'0'
            && matches!(rest[1], b'x' | b'X' | b'b' | b'B' | b'o' | b'O');
        if radix_prefix {
            i = 2;
            while rest.get(i).is_some_and(|c| c.is_ascii_hexdigit() || *c == b'_') {
                i += 1;
            }
        } else {
            while rest.get(i).is_some_and(|c| c.is_ascii_digit() || *c == b'_') {
                i += 1;
            }
            if rest.get(i) == Some(&b'.') && rest.get(i + 1) != Some(&b'.') {
                i += 1;
                while rest.get(i).is_some_and(|c| c.is_ascii_digit() || *c == b'_') {
                    i += 1;
                }
            }
            if matches!(rest.get(i), Some(b'e' | b'E')) {
                let mut j = i + 1;
                if matches!(rest.get(j), Some(b'+' | b'-')) {
                    j += 1;
                }
                if rest.get(j).is_some_and(|c| c.is_ascii_digit()) {
                    i = j;
                    while rest.get(i).is_some_and(|c| c.is_ascii_digit()) {
                        i += 1;
                    }
                }
            }
        }
        self.emit(TokenKind::Number, self.pos + i);
    }

    fn operator(&mut self) -> Result<(), LexError> {
        if let Some(op) = OPERATORS.iter().find(|op| self.starts_with(op)) {
            self.emit(TokenKind::Operator, self.pos + op.len());
            return Ok(());
        }
        let b = self.bytes[self.pos];
        if PUNCT.contains(&b) {
            self.emit(TokenKind::Punct, self.pos + 1);
            return Ok(());
        }
        let ch = self.src[self.pos..].chars().next().unwrap_or('\u{fffd}');
        Err(LexError::UnexpectedChar {
            ch,
            offset: self.pos,
            line: self.line,
        })
    }
}
