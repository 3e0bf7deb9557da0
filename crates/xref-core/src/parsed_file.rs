//! The Parsed File: a token arena plus derived structural indices.
//!
//! A [`ParsedFile`] is the sole owner of its token array. Namespaces, classes,
//! functions, constants and the bracket-pair table all refer back into that
//! array by index only, so the whole thing can be dropped as a unit once the
//! plugins for a file have run.
//!
//! Besides the entity lists, the file keeps two per-token lookup tables
//! (owning class, owning function) so that `class_at`/`function_at` are O(1).
//! Both resolve to the innermost entity when entities nest (closures inside
//! methods, anonymous classes inside functions).

use crate::model::{Class, ClassId, Constant, Function, FunctionId, Namespace};
use crate::token::Token;

/// Entity lists and bracket pairs produced by a model builder.
#[derive(Debug, Clone, Default)]
pub struct FileModel {
    /// Pair index for every bracket token, `None` elsewhere. Indexed by token.
    pub brackets: Vec<Option<usize>>,
    /// Ordered, non-overlapping namespace records. May be empty, in which
    /// case a single global record spanning the file is synthesized.
    pub namespaces: Vec<Namespace>,
    pub classes: Vec<Class>,
    pub functions: Vec<Function>,
    /// File-level constants (`const X = 1;` outside a class).
    pub constants: Vec<Constant>,
}

/// An indexed, queryable view of one source file.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    file_name: String,
    tokens: Vec<Token>,
    brackets: Vec<Option<usize>>,
    namespaces: Vec<Namespace>,
    classes: Vec<Class>,
    functions: Vec<Function>,
    constants: Vec<Constant>,
    class_owner: Vec<Option<ClassId>>,
    function_owner: Vec<Option<FunctionId>>,
}

impl ParsedFile {
    pub fn new(file_name: impl Into<String>, tokens: Vec<Token>, model: FileModel) -> Self {
        let len = tokens.len();
        let FileModel {
            mut brackets,
            mut namespaces,
            classes,
            functions,
            constants,
        } = model;

        brackets.resize(len, None);
        if namespaces.is_empty() {
            namespaces.push(Namespace {
                index: 0,
                name: String::new(),
                body_starts: 0,
                body_ends: len.saturating_sub(1),
                import_map: Default::default(),
            });
        }
        namespaces.sort_by_key(|ns| ns.index);

        let class_owner = owner_table(
            len,
            classes
                .iter()
                .enumerate()
                .map(|(i, c)| (ClassId::new(i as u32), c.index, c.body_ends)),
        );
        let function_owner = owner_table(
            len,
            functions
                .iter()
                .enumerate()
                .map(|(i, f)| (FunctionId::new(i as u32), f.index, f.body_ends)),
        );

        ParsedFile {
            file_name: file_name.into(),
            tokens,
            brackets,
            namespaces,
            classes,
            functions,
            constants,
            class_owner,
            function_owner,
        }
    }

    // ------------------------------------------------------------------------
    // Tokens
    // ------------------------------------------------------------------------

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn token_at(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    /// First non-whitespace, non-comment token after `index`.
    pub fn next_non_space(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index + 1..)?.iter().find(|t| !t.is_space())
    }

    /// Last non-whitespace, non-comment token before `index`.
    pub fn prev_non_space(&self, index: usize) -> Option<&Token> {
        let end = index.min(self.tokens.len());
        self.tokens[..end].iter().rev().find(|t| !t.is_space())
    }

    /// Matching bracket of the bracket token at `index`, in either direction.
    pub fn paired_bracket(&self, index: usize) -> Option<usize> {
        self.brackets.get(index).copied().flatten()
    }

    pub fn line_number_at(&self, index: usize) -> u32 {
        self.tokens.get(index).map(|t| t.line_number).unwrap_or(0)
    }

    pub fn number_of_lines(&self) -> u32 {
        match self.tokens.last() {
            Some(last) => last.line_number + last.text.matches('\n').count() as u32,
            None => 0,
        }
    }

    /// Top-level list elements starting at `start` (the token after the opening
    /// bracket). See [`extract_list`].
    pub fn extract_list(&self, start: usize, separator: &str, terminator: &str) -> Vec<usize> {
        extract_list(&self.tokens, start, separator, terminator)
    }

    // ------------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------------

    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    pub fn classes(&self) -> &[Class] {
        &self.classes
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    pub fn class(&self, id: ClassId) -> Option<&Class> {
        self.classes.get(id.index())
    }

    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.index())
    }

    /// Methods of a class, in declaration order.
    pub fn methods_of<'a>(&'a self, class: &'a Class) -> impl Iterator<Item = &'a Function> + 'a {
        class.methods.iter().filter_map(move |id| self.function(*id))
    }

    /// Innermost class whose extent contains `index`.
    pub fn class_at(&self, index: usize) -> Option<&Class> {
        let id = self.class_owner.get(index).copied().flatten()?;
        self.class(id)
    }

    /// Innermost function, method or closure whose extent contains `index`.
    pub fn function_at(&self, index: usize) -> Option<&Function> {
        let id = self.function_owner.get(index).copied().flatten()?;
        self.function(id)
    }

    /// The namespace record covering `index`.
    pub fn namespace_at(&self, index: usize) -> &Namespace {
        let pos = self.namespaces.partition_point(|ns| ns.index <= index);
        &self.namespaces[pos.saturating_sub(1)]
    }

    /// Resolve `name` against the namespace active at `index`.
    ///
    /// The result never carries a leading separator.
    pub fn qualify_name(&self, name: &str, index: usize) -> String {
        qualify(name, self.namespace_at(index))
    }
}

/// Resolve a class-like name against a namespace record.
///
/// - `\A\B` is already fully qualified: the separator is stripped.
/// - `namespace\A` is relative to the current namespace.
/// - Otherwise the first segment is looked up (case-insensitively) in the
///   import map and substituted; failing that the namespace name is prepended.
pub fn qualify(name: &str, namespace: &Namespace) -> String {
    if let Some(stripped) = name.strip_prefix('\\') {
        return stripped.to_string();
    }

    let (first, rest) = match name.find('\\') {
        Some(pos) => (&name[..pos], &name[pos..]),
        None => (name, ""),
    };

    if first.eq_ignore_ascii_case("namespace") && !rest.is_empty() {
        return prefix_namespace(&namespace.name, &rest[1..]);
    }

    if let Some(imported) = namespace.import_map.get(&first.to_ascii_lowercase()) {
        return format!("{}{}", imported, rest);
    }

    prefix_namespace(&namespace.name, name)
}

fn prefix_namespace(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}\\{}", namespace, name)
    }
}

/// Top-level elements of a bracketed list.
///
/// `start` is the first token after the opening bracket. Returns the index of
/// the first non-space token of every non-empty element, where elements are
/// separated by `separator` at nesting depth zero. Scanning stops at
/// `terminator` at depth zero, at the bracket that closes the list, or at the
/// end of the stream.
///
/// ```text
/// function foo(a, b, &c)       ","  ")"  ->  [a, b, &]
/// list(a, list(b, c), d)       ","  ")"  ->  [a, list, d]
/// for (i = 0; i < 10; ++i)     ";"  ")"  ->  [i, i, ++]
/// function()                   ","  ")"  ->  []
/// ```
pub fn extract_list(tokens: &[Token], start: usize, separator: &str, terminator: &str) -> Vec<usize> {
    let mut elements = Vec::new();
    let mut depth = 0usize;
    let mut element_start: Option<usize> = None;

    for token in tokens.iter().skip(start) {
        if depth == 0 {
            if token.is(terminator) || (token.is_close_bracket() && !token.is(separator)) {
                break;
            }
            if token.is(separator) {
                if let Some(first) = element_start.take() {
                    elements.push(first);
                }
                continue;
            }
        }
        if token.is_open_bracket() {
            depth += 1;
        } else if token.is_close_bracket() {
            depth -= 1;
        }
        if element_start.is_none() && !token.is_space() {
            element_start = Some(token.index);
        }
    }

    if let Some(first) = element_start {
        elements.push(first);
    }
    elements
}

/// Map every token to the innermost entity whose extent covers it.
///
/// Entities are applied in ascending start order; nested entities start later
/// and therefore overwrite their container.
fn owner_table<Id: Copy>(
    len: usize,
    extents: impl Iterator<Item = (Id, usize, usize)>,
) -> Vec<Option<Id>> {
    let mut extents: Vec<_> = extents.collect();
    extents.sort_by_key(|&(_, start, _)| start);

    let mut owner = vec![None; len];
    for (id, start, end) in extents {
        if start >= len {
            continue;
        }
        let end = end.min(len - 1);
        for slot in &mut owner[start..=end] {
            *slot = Some(id);
        }
    }
    owner
}
