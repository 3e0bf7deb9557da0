//! Single-pass model builder.
//!
//! Walks the token stream once, keeping a bracket stack whose entries know
//! what scope they open (class body, function body, braced namespace or a
//! plain block). Declaration headers are read by short lookaheads from their
//! keyword; the body `{` found by the lookahead is registered so that the main
//! pass can tag it with the right scope when it gets there.
//!
//! Names that depend on `use` imports (parents, interfaces, traits, type
//! hints) are stored as written and resolved only after the pass, once every
//! import map is complete.

use std::collections::HashMap;

use tracing::trace;

use xref_core::error::ParseError;
use xref_core::model::{
    Attributes, Class, ClassId, ClassKind, Constant, Function, FunctionId, Namespace, Parameter,
    Property,
};
use xref_core::parsed_file::{extract_list, qualify, FileModel};
use xref_core::token::{closing_bracket, Token, TokenKind};

/// Name given to `new class { ... }`.
pub const ANONYMOUS_CLASS_NAME: &str = "class@anonymous";

/// Type hints that never name a class.
const BUILTIN_TYPES: &[&str] = &[
    "array", "bool", "boolean", "callable", "double", "false", "float", "int", "integer",
    "iterable", "mixed", "never", "null", "object", "parent", "self", "static", "string", "true",
    "void",
];

pub fn is_builtin_type(name: &str) -> bool {
    BUILTIN_TYPES.iter().any(|b| b.eq_ignore_ascii_case(name))
}

/// Build the structural model of a tokenized file.
pub fn build_model(tokens: &[Token]) -> Result<FileModel, ParseError> {
    ModelBuilder::new(tokens).run()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Block,
    ClassBody(ClassId),
    FunctionBody(FunctionId),
    Namespace(usize),
}

#[derive(Debug, Clone, Copy)]
struct OpenBracket {
    index: usize,
    scope: Scope,
}

struct ModelBuilder<'t> {
    tokens: &'t [Token],
    brackets: Vec<Option<usize>>,
    stack: Vec<OpenBracket>,
    /// Body `{` positions found by header lookahead.
    bodies: HashMap<usize, Scope>,
    namespaces: Vec<Namespace>,
    classes: Vec<Class>,
    functions: Vec<Function>,
    constants: Vec<Constant>,
    modifiers: Attributes,
    /// Type of the property statement in progress (`public ?int $a, $b;`).
    property_type: Option<String>,
    /// Statement tokens before this index were consumed by a lookahead.
    skip_until: usize,
}

impl<'t> ModelBuilder<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        ModelBuilder {
            tokens,
            brackets: vec![None; tokens.len()],
            stack: Vec::new(),
            bodies: HashMap::new(),
            namespaces: vec![global_record(0)],
            classes: Vec::new(),
            functions: Vec::new(),
            constants: Vec::new(),
            modifiers: Attributes::empty(),
            property_type: None,
            skip_until: 0,
        }
    }

    fn run(mut self) -> Result<FileModel, ParseError> {
        let tokens = self.tokens;
        for (i, token) in tokens.iter().enumerate() {
            if token.is_space() {
                continue;
            }
            if token.is_open_bracket() {
                self.open_bracket(i);
            } else if token.is_close_bracket() {
                self.close_bracket(i)?;
            }
            if i >= self.skip_until {
                self.statement_token(i);
            }
        }

        if let Some(open) = self.stack.last() {
            let token = &tokens[open.index];
            return Err(ParseError::new(
                format!("unclosed '{}' opened on line {}", token.text, token.line_number),
                token.line_number,
            ));
        }
        Ok(self.finish())
    }

    // ------------------------------------------------------------------------
    // Brackets
    // ------------------------------------------------------------------------

    fn open_bracket(&mut self, i: usize) {
        let scope = self.bodies.remove(&i).unwrap_or(Scope::Block);
        if self.tokens[i].is("{") {
            self.reset_statement();
        }
        self.stack.push(OpenBracket { index: i, scope });
    }

    fn close_bracket(&mut self, i: usize) -> Result<(), ParseError> {
        let tokens = self.tokens;
        let token = &tokens[i];
        let Some(open) = self.stack.pop() else {
            return Err(ParseError::new(
                format!("unmatched '{}' on line {}", token.text, token.line_number),
                token.line_number,
            ));
        };
        let opener = &tokens[open.index];
        let expected = closing_bracket(&opener.text).unwrap_or_default();
        if token.text != expected {
            return Err(ParseError::new(
                format!(
                    "mismatched '{}' on line {}, expected '{}' to close line {}",
                    token.text, token.line_number, expected, opener.line_number
                ),
                token.line_number,
            ));
        }

        self.brackets[open.index] = Some(i);
        self.brackets[i] = Some(open.index);
        match open.scope {
            Scope::Block => {}
            Scope::ClassBody(id) => self.classes[id.index()].body_ends = i,
            Scope::FunctionBody(id) => self.functions[id.index()].body_ends = i,
            Scope::Namespace(k) => {
                self.namespaces[k].body_ends = i;
                self.namespaces.push(global_record(i + 1));
            }
        }
        if token.is("}") {
            self.reset_statement();
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    fn statement_token(&mut self, i: usize) {
        let tokens = self.tokens;
        let token = &tokens[i];
        if token.is_terminator() {
            self.reset_statement();
            return;
        }
        match token.kind {
            TokenKind::Variable if self.class_body().is_some() => self.property(i),
            TokenKind::Name if token.is_word("enum") && self.at_namespace_level() => {
                if self.next_sig(i).is_some_and(|j| tokens[j].kind == TokenKind::Name) {
                    self.class_header(i, ClassKind::Class);
                }
            }
            TokenKind::Keyword => self.keyword(i),
            _ => {}
        }
    }

    fn keyword(&mut self, i: usize) {
        let word = self.tokens[i].text.to_ascii_lowercase();
        match word.as_str() {
            "namespace" => {
                let relative = self
                    .next_sig(i)
                    .is_some_and(|j| self.tokens[j].kind == TokenKind::NsSeparator);
                if !relative && self.at_namespace_level() {
                    self.namespace_declaration(i);
                }
            }
            "use" => {
                let after_paren = self.prev_sig(i).is_some_and(|j| self.tokens[j].is(")"));
                if self.class_body().is_some() {
                    self.trait_use(i);
                } else if self.at_namespace_level() && !after_paren {
                    self.use_imports(i);
                }
            }
            "class" => self.class_header(i, ClassKind::Class),
            "interface" => self.class_header(i, ClassKind::Interface),
            "trait" => self.class_header(i, ClassKind::Trait),
            "function" | "fn" => self.function_header(i),
            "const" => self.constant_declaration(i),
            _ => {
                if let Some(flag) = Attributes::from_keyword(&word) {
                    let class_level = self.class_body().is_some();
                    let class_modifier = Attributes::ABSTRACT.union(Attributes::FINAL).contains(flag);
                    if class_level || (class_modifier && self.at_namespace_level()) {
                        self.modifiers.insert(flag);
                    }
                }
            }
        }
    }

    fn reset_statement(&mut self) {
        self.modifiers = Attributes::empty();
        self.property_type = None;
    }

    fn take_modifiers(&mut self) -> Attributes {
        std::mem::take(&mut self.modifiers)
    }

    /// Class whose body is the innermost open bracket.
    fn class_body(&self) -> Option<ClassId> {
        match self.stack.last() {
            Some(OpenBracket {
                scope: Scope::ClassBody(id),
                ..
            }) => Some(*id),
            _ => None,
        }
    }

    /// Innermost class anywhere on the bracket stack.
    fn enclosing_class(&self) -> Option<ClassId> {
        self.stack.iter().rev().find_map(|open| match open.scope {
            Scope::ClassBody(id) => Some(id),
            _ => None,
        })
    }

    fn at_namespace_level(&self) -> bool {
        match self.stack.last() {
            None => true,
            Some(open) => matches!(open.scope, Scope::Namespace(_)),
        }
    }

    fn current_namespace_name(&self) -> &str {
        self.namespaces
            .last()
            .map(|ns| ns.name.as_str())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // Namespaces and imports
    // ------------------------------------------------------------------------

    fn namespace_declaration(&mut self, i: usize) {
        let Some(j) = self.next_sig(i) else {
            return;
        };
        let (name, after_name) = self.read_name(j);
        let Some(k) = self.sig_at_or_after(after_name) else {
            return;
        };
        let terminator = &self.tokens[k];
        let braced = terminator.is("{");
        if !braced && !terminator.is_terminator() {
            return;
        }

        // Close the record in progress; drop it if it covers nothing.
        if let Some(last) = self.namespaces.last_mut() {
            if last.index >= i {
                self.namespaces.pop();
            } else {
                last.body_ends = i - 1;
            }
        }

        let record = self.namespaces.len();
        self.namespaces.push(Namespace {
            index: i,
            name: name.trim_start_matches('\\').to_string(),
            body_starts: if braced { k } else { k + 1 },
            body_ends: self.tokens.len().saturating_sub(1),
            import_map: Default::default(),
        });
        if braced {
            self.bodies.insert(k, Scope::Namespace(record));
        }
        trace!(name = %name, index = i, braced, "namespace");
        self.skip_until = k;
    }

    /// `use A\B as C, D;`, `use A\{B, C as D};`. Function and constant
    /// imports are skipped.
    fn use_imports(&mut self, i: usize) {
        let tokens = self.tokens;
        let Some(first) = self.next_sig(i) else {
            return;
        };
        let skip_statement =
            tokens[first].is_keyword("function") || tokens[first].is_keyword("const");

        let mut imports: Vec<(String, String)> = Vec::new();
        let mut prefix = String::new();
        let mut name = String::new();
        let mut alias: Option<String> = None;
        let mut skip_entry = false;
        let mut j = first;
        let mut end = tokens.len();

        while j < tokens.len() {
            let t = &tokens[j];
            if t.is_space() {
                j += 1;
                continue;
            }
            if t.is_terminator() {
                end = j;
                break;
            }
            if t.is_keyword("as") {
                if let Some(a) = self.next_sig(j) {
                    alias = Some(tokens[a].text.clone());
                    j = a;
                }
            } else if t.is("{") {
                prefix = std::mem::take(&mut name);
            } else if t.is(",") || t.is("}") {
                if !skip_entry {
                    push_import(&mut imports, &prefix, &name, alias.take());
                }
                name.clear();
                alias = None;
                skip_entry = false;
                if t.is("}") {
                    prefix.clear();
                }
            } else if name.is_empty() && !prefix.is_empty() && (t.is_keyword("function") || t.is_keyword("const")) {
                skip_entry = true;
            } else if matches!(t.kind, TokenKind::Name | TokenKind::Keyword | TokenKind::NsSeparator) {
                name.push_str(&t.text);
            }
            j += 1;
        }
        if !skip_entry {
            push_import(&mut imports, &prefix, &name, alias.take());
        }

        if !skip_statement {
            if let Some(ns) = self.namespaces.last_mut() {
                for (alias, full) in imports {
                    ns.import_map.insert(alias, full);
                }
            }
        }
        self.skip_until = end;
    }

    fn trait_use(&mut self, i: usize) {
        let Some(class_id) = self.class_body() else {
            return;
        };
        let Some(start) = self.next_sig(i) else {
            return;
        };
        let (names, end) = self.read_name_list(start);
        self.classes[class_id.index()].uses.extend(names);
        self.skip_until = end;
    }

    // ------------------------------------------------------------------------
    // Classes
    // ------------------------------------------------------------------------

    fn class_header(&mut self, i: usize, kind: ClassKind) {
        let tokens = self.tokens;
        let anonymous = self.prev_sig(i).is_some_and(|p| tokens[p].is_keyword("new"));
        let Some(mut j) = self.next_sig(i) else {
            return;
        };

        let (name_index, name) = if anonymous {
            if tokens[j].is("(") {
                let Some(close) = self.matching(j) else {
                    return;
                };
                let Some(next) = self.next_sig(close) else {
                    return;
                };
                j = next;
            }
            (None, ANONYMOUS_CLASS_NAME.to_string())
        } else {
            if !matches!(tokens[j].kind, TokenKind::Name | TokenKind::Keyword) {
                return;
            }
            let name = prefix_namespace(self.current_namespace_name(), &tokens[j].text);
            let name_index = j;
            let Some(next) = self.next_sig(j) else {
                return;
            };
            j = next;
            // enum backing type
            if tokens[j].is(":") {
                let Some(next) = self.next_sig(j).and_then(|t| self.next_sig(t)) else {
                    return;
                };
                j = next;
            }
            (Some(name_index), name)
        };

        let mut extends = Vec::new();
        let mut implements = Vec::new();
        if tokens[j].is_keyword("extends") {
            let Some(start) = self.next_sig(j) else {
                return;
            };
            (extends, j) = self.read_name_list(start);
        }
        if j < tokens.len() && tokens[j].is_keyword("implements") {
            let Some(start) = self.next_sig(j) else {
                return;
            };
            (implements, j) = self.read_name_list(start);
        }
        if j >= tokens.len() || !tokens[j].is("{") {
            return;
        }

        let id = ClassId::new(self.classes.len() as u32);
        trace!(class = %name, index = i, "class header");
        let attributes = self.take_modifiers();
        self.classes.push(Class {
            index: i,
            kind,
            name_index,
            name,
            extends,
            implements,
            uses: Vec::new(),
            body_starts: j,
            body_ends: j,
            methods: Vec::new(),
            properties: Vec::new(),
            constants: Vec::new(),
            attributes,
        });
        self.bodies.insert(j, Scope::ClassBody(id));
    }

    fn property(&mut self, i: usize) {
        let Some(class_id) = self.class_body() else {
            return;
        };
        let type_name = match self.declared_type_before(i) {
            Some(declared) => {
                let declared = (!declared.is_empty()).then_some(declared);
                self.property_type = declared.clone();
                declared
            }
            None => self.property_type.clone(),
        };
        let class = &mut self.classes[class_id.index()];
        class.properties.push(Property {
            index: i,
            name: self.tokens[i].text.clone(),
            class_name: Some(class.name.clone()),
            type_name,
            attributes: self.modifiers,
        });
    }

    /// Type text written between the modifiers and the property variable at
    /// `i`. `None` when the variable follows a `,` and shares the statement's
    /// type.
    fn declared_type_before(&self, i: usize) -> Option<String> {
        let mut parts: Vec<&str> = Vec::new();
        for t in self.tokens[..i].iter().rev() {
            if t.is_space() {
                continue;
            }
            if t.is(",") {
                return None;
            }
            let is_modifier = t.kind == TokenKind::Keyword
                && (Attributes::from_keyword(&t.text).is_some() || t.is_keyword("readonly"));
            if is_modifier || t.is(";") || t.is("{") || t.is("}") || t.is("]") {
                break;
            }
            parts.push(&t.text);
        }
        parts.reverse();
        Some(parts.concat())
    }

    fn constant_declaration(&mut self, i: usize) {
        let class_id = self.class_body();
        if class_id.is_none() && !self.at_namespace_level() {
            return;
        }
        let attributes = self.take_modifiers();
        let class_name = class_id.map(|id| self.classes[id.index()].name.clone());
        let namespace = self.current_namespace_name().to_string();

        let mut constants = Vec::new();
        for start in extract_list(self.tokens, i + 1, ",", ";") {
            let Some(name_index) = self.constant_name(start) else {
                continue;
            };
            let text = &self.tokens[name_index].text;
            let name = match class_name {
                Some(_) => text.clone(),
                None => prefix_namespace(&namespace, text),
            };
            constants.push(Constant {
                index: name_index,
                name,
                class_name: class_name.clone(),
                attributes,
            });
        }

        match class_id {
            Some(id) => self.classes[id.index()].constants.extend(constants),
            None => self.constants.extend(constants),
        }
    }

    /// Last identifier before `=` in a constant element (skips a typed
    /// constant's type).
    fn constant_name(&self, start: usize) -> Option<usize> {
        let mut name = None;
        for t in &self.tokens[start..] {
            if t.is("=") || t.is(",") || t.is_terminator() {
                break;
            }
            if matches!(t.kind, TokenKind::Name | TokenKind::Keyword) {
                name = Some(t.index);
            }
        }
        name
    }

    // ------------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------------

    fn function_header(&mut self, i: usize) {
        let tokens = self.tokens;
        let is_arrow = tokens[i].is_keyword("fn");
        let Some(mut j) = self.next_sig(i) else {
            return;
        };

        let returns_reference = tokens[j].is("&");
        if returns_reference {
            let Some(next) = self.next_sig(j) else {
                return;
            };
            j = next;
        }

        let mut name_index = None;
        if !is_arrow && matches!(tokens[j].kind, TokenKind::Name | TokenKind::Keyword) {
            name_index = Some(j);
            let Some(next) = self.next_sig(j) else {
                return;
            };
            j = next;
        }
        if !tokens[j].is("(") {
            return;
        }
        let Some(params_close) = self.matching(j) else {
            return;
        };

        let mut promoted = Vec::new();
        let mut parameters = Vec::new();
        for start in extract_list(tokens, j + 1, ",", ")") {
            let (parameter, promotion) = self.parameter(start, params_close);
            if let Some(attributes) = promotion {
                promoted.push((parameter.clone(), attributes));
            }
            parameters.push(parameter);
        }

        let Some(mut k) = self.next_sig(params_close) else {
            return;
        };
        let mut used_variables = Vec::new();
        if tokens[k].is_keyword("use") {
            let Some(open) = self.next_sig(k).filter(|&o| tokens[o].is("(")) else {
                return;
            };
            let Some(close) = self.matching(open) else {
                return;
            };
            used_variables = extract_list(tokens, open + 1, ",", ")")
                .into_iter()
                .map(|start| self.parameter(start, close).0)
                .collect();
            let Some(next) = self.next_sig(close) else {
                return;
            };
            k = next;
        }
        if tokens[k].is(":") {
            let Some(after) = self.skip_return_type(k) else {
                return;
            };
            k = after;
        }

        let body = &tokens[k];
        let (body_starts, body_ends, is_declaration) = if body.is("{") {
            (Some(k), k, false)
        } else if body.is_terminator() {
            (None, k, true)
        } else if body.is("=>") {
            (Some(k), self.arrow_body_end(k), false)
        } else {
            return;
        };

        let method_of = if name_index.is_some() {
            self.class_body()
        } else {
            None
        };
        let class_id = match name_index {
            Some(_) => method_of,
            None => self.enclosing_class(),
        };
        let class_name = class_id.map(|id| self.classes[id.index()].name.clone());
        let name = name_index.map(|n| {
            let text = &tokens[n].text;
            match method_of {
                Some(_) => text.clone(),
                None => prefix_namespace(self.current_namespace_name(), text),
            }
        });

        let id = FunctionId::new(self.functions.len() as u32);
        let attributes = self.take_modifiers();
        trace!(function = ?name, index = i, "function header");

        if let (Some(class), Some(n)) = (method_of, name.as_deref()) {
            if n.eq_ignore_ascii_case("__construct") {
                let class = &mut self.classes[class.index()];
                for (p, attributes) in promoted {
                    class.properties.push(Property {
                        index: p.index,
                        name: p.name,
                        class_name: Some(class.name.clone()),
                        type_name: p.type_name,
                        attributes,
                    });
                }
            }
            self.classes[class.index()].methods.push(id);
        }

        self.functions.push(Function {
            index: i,
            name,
            name_index,
            class_name,
            class_id,
            body_starts,
            body_ends,
            returns_reference,
            parameters,
            used_variables,
            is_declaration,
            attributes,
        });
        if body.is("{") {
            self.bodies.insert(k, Scope::FunctionBody(id));
        }
        self.skip_until = k;
    }

    /// Parse the parameter starting at `start`, ending at the next top-level
    /// `,` or at `list_close`. Also returns the visibility of a promoted
    /// constructor parameter.
    fn parameter(&self, start: usize, list_close: usize) -> (Parameter, Option<Attributes>) {
        let tokens = self.tokens;
        let mut type_name = String::new();
        let mut name: Option<String> = None;
        let mut is_passed_by_reference = false;
        let mut is_variadic = false;
        let mut has_default_value = false;
        let mut promotion: Option<Attributes> = None;

        let mut depth = 0usize;
        let mut k = start;
        while k < list_close {
            let t = &tokens[k];
            if depth == 0 && t.is(",") {
                break;
            }
            if t.is_space() {
                k += 1;
                continue;
            }
            if name.is_none() && t.is("#") && tokens.get(k + 1).is_some_and(|n| n.is("[")) {
                k = self.matching(k + 1).unwrap_or(list_close) + 1;
                continue;
            }
            if t.is_open_bracket() {
                depth += 1;
            } else if t.is_close_bracket() {
                depth = depth.saturating_sub(1);
            }

            if name.is_none() {
                let modifier = match t.kind {
                    TokenKind::Keyword => Attributes::from_keyword(&t.text),
                    _ => None,
                };
                if let Some(flag) = modifier {
                    promotion.get_or_insert_with(Attributes::empty).insert(flag);
                } else if t.is_keyword("readonly") {
                    promotion.get_or_insert_with(Attributes::empty);
                } else if t.is("...") {
                    is_variadic = true;
                } else if t.is("&") && self.next_sig(k).is_some_and(|n| {
                    tokens[n].kind == TokenKind::Variable || tokens[n].is("...")
                }) {
                    is_passed_by_reference = true;
                } else if t.kind == TokenKind::Variable {
                    name = Some(t.text.clone());
                } else {
                    type_name.push_str(&t.text);
                }
            } else if depth == 0 && t.is("=") {
                has_default_value = true;
                break;
            }
            k += 1;
        }

        let parameter = Parameter {
            index: start,
            name: name.unwrap_or_default(),
            type_name: (!type_name.is_empty()).then_some(type_name),
            is_passed_by_reference,
            has_default_value,
            is_variadic,
        };
        (parameter, promotion)
    }

    /// First token after a `: Type` return declaration starting at `colon`.
    fn skip_return_type(&self, colon: usize) -> Option<usize> {
        let mut k = self.next_sig(colon)?;
        loop {
            let t = &self.tokens[k];
            if t.is("{") || t.is("=>") || t.is_terminator() {
                return Some(k);
            }
            if t.is("(") {
                k = self.matching(k)?;
            }
            k = self.next_sig(k)?;
        }
    }

    /// Last significant token of an arrow function body: the expression ends
    /// at a top-level `;`, `,` or at the bracket enclosing the `fn`.
    fn arrow_body_end(&self, arrow: usize) -> usize {
        let mut depth = 0usize;
        let mut last = arrow;
        for t in &self.tokens[arrow + 1..] {
            if t.is_space() {
                continue;
            }
            if depth == 0 && (t.is(";") || t.is(",") || t.is_terminator() || t.is_close_bracket()) {
                break;
            }
            if t.is_open_bracket() {
                depth += 1;
            } else if t.is_close_bracket() {
                depth -= 1;
            }
            last = t.index;
        }
        last
    }

    // ------------------------------------------------------------------------
    // Lookahead helpers
    // ------------------------------------------------------------------------

    fn sig_at_or_after(&self, i: usize) -> Option<usize> {
        self.tokens
            .get(i..)?
            .iter()
            .find(|t| !t.is_space())
            .map(|t| t.index)
    }

    fn next_sig(&self, i: usize) -> Option<usize> {
        self.sig_at_or_after(i + 1)
    }

    fn prev_sig(&self, i: usize) -> Option<usize> {
        self.tokens[..i]
            .iter()
            .rev()
            .find(|t| !t.is_space())
            .map(|t| t.index)
    }

    /// Closing bracket for the opener at `open`, by depth counting.
    fn matching(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for t in &self.tokens[open..] {
            if t.is_open_bracket() {
                depth += 1;
            } else if t.is_close_bracket() {
                depth -= 1;
                if depth == 0 {
                    return Some(t.index);
                }
            }
        }
        None
    }

    /// A possibly qualified name starting at `i`. Returns the name and the
    /// index just past it.
    fn read_name(&self, i: usize) -> (String, usize) {
        let mut name = String::new();
        let mut k = i;
        while let Some(t) = self.tokens.get(k) {
            if !matches!(t.kind, TokenKind::Name | TokenKind::Keyword | TokenKind::NsSeparator) {
                break;
            }
            name.push_str(&t.text);
            k += 1;
        }
        (name, k)
    }

    /// `A, B\C, D` starting at `i`. Returns the names and the index of the
    /// first significant token after the list.
    fn read_name_list(&self, i: usize) -> (Vec<String>, usize) {
        let mut names = Vec::new();
        let mut k = i;
        loop {
            let (name, after) = self.read_name(k);
            if name.is_empty() {
                return (names, k);
            }
            names.push(name);
            let Some(next) = self.sig_at_or_after(after) else {
                return (names, self.tokens.len());
            };
            if !self.tokens[next].is(",") {
                return (names, next);
            }
            match self.next_sig(next) {
                Some(n) => k = n,
                None => return (names, self.tokens.len()),
            }
        }
    }

    // ------------------------------------------------------------------------
    // Finish
    // ------------------------------------------------------------------------

    fn finish(self) -> FileModel {
        let ModelBuilder {
            tokens,
            brackets,
            mut namespaces,
            mut classes,
            mut functions,
            constants,
            ..
        } = self;

        if tokens.is_empty() {
            namespaces.clear();
        } else {
            let last = tokens.len() - 1;
            if let Some(ns) = namespaces.last_mut() {
                if ns.body_ends < ns.index || ns.body_ends > last {
                    ns.body_ends = last;
                }
            }
            namespaces.retain(|ns| ns.index <= last && ns.index <= ns.body_ends);
        }

        let namespace_for = |index: usize| -> Namespace {
            let pos = namespaces.partition_point(|ns| ns.index <= index);
            namespaces
                .get(pos.saturating_sub(1))
                .cloned()
                .unwrap_or_else(|| global_record(0))
        };

        for class in &mut classes {
            let ns = namespace_for(class.index);
            for list in [&mut class.extends, &mut class.implements, &mut class.uses] {
                for name in list.iter_mut() {
                    *name = qualify(name, &ns);
                }
            }
            for property in &mut class.properties {
                property.type_name = property.type_name.take().map(|t| resolve_type(&t, &ns));
            }
        }
        for function in &mut functions {
            let ns = namespace_for(function.index);
            for parameter in &mut function.parameters {
                parameter.type_name = parameter.type_name.take().map(|t| resolve_type(&t, &ns));
            }
        }

        FileModel {
            brackets,
            namespaces,
            classes,
            functions,
            constants,
        }
    }
}

fn global_record(index: usize) -> Namespace {
    Namespace {
        index,
        name: String::new(),
        body_starts: index,
        body_ends: usize::MAX,
        import_map: Default::default(),
    }
}

fn prefix_namespace(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}\\{}", namespace, name)
    }
}

fn push_import(imports: &mut Vec<(String, String)>, prefix: &str, name: &str, alias: Option<String>) {
    if name.is_empty() {
        return;
    }
    let full = format!("{}{}", prefix, name);
    let full = full.trim_start_matches('\\').to_string();
    let alias = alias.unwrap_or_else(|| {
        full.rsplit('\\')
            .next()
            .unwrap_or(full.as_str())
            .to_string()
    });
    imports.push((alias.to_ascii_lowercase(), full));
}

/// Qualify every class name inside a type hint (`?Foo`, `A|B`, `(A&B)|null`),
/// leaving builtin types alone.
pub fn resolve_type(type_name: &str, namespace: &Namespace) -> String {
    let mut out = String::with_capacity(type_name.len());
    let mut word = String::new();
    let flush = |word: &mut String, out: &mut String| {
        if word.is_empty() {
            return;
        }
        if is_builtin_type(word) {
            out.push_str(word);
        } else {
            out.push_str(&qualify(word, namespace));
        }
        word.clear();
    };
    for c in type_name.chars() {
        if c.is_alphanumeric() || c == '_' || c == '\\' {
            word.push(c);
        } else {
            flush(&mut word, &mut out);
            out.push(c);
        }
    }
    flush(&mut word, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn model(src: &str) -> (Vec<Token>, FileModel) {
        let tokens = tokenize(src.as_bytes()).unwrap();
        let model = build_model(&tokens).unwrap();
        (tokens, model)
    }

    fn error(src: &str) -> ParseError {
        let tokens = tokenize(src.as_bytes()).unwrap();
        build_model(&tokens).unwrap_err()
    }

    mod brackets {
        use super::*;

        #[test]
        fn pairs_are_recorded_both_ways() {
            let (tokens, m) = model("<?php f([1, (2)]);");
            for (i, pair) in m.brackets.iter().enumerate() {
                if let Some(j) = pair {
                    assert_eq!(m.brackets[*j], Some(i));
                    assert!(tokens[i].is_open_bracket() != tokens[*j].is_open_bracket());
                }
            }
            assert_eq!(m.brackets.iter().filter(|p| p.is_some()).count(), 6);
        }

        #[test]
        fn underflow_fails() {
            let e = error("<?php\n\n}");
            assert_eq!(e.line_number, 3);
            assert!(e.message.contains("unmatched '}'"));
        }

        #[test]
        fn mismatch_fails() {
            let e = error("<?php f(1];");
            assert!(e.message.contains("mismatched ']'"), "{}", e.message);
        }

        #[test]
        fn unclosed_at_eof_fails() {
            let e = error("<?php\nfunction f() {\n");
            assert_eq!(e.line_number, 2);
            assert!(e.message.contains("unclosed '{'"));
        }

        #[test]
        fn brackets_inside_strings_are_ignored() {
            let (_, m) = model("<?php $a = '{'; $b = \"(\";");
            assert!(m.brackets.iter().all(Option::is_none));
        }
    }

    mod namespaces {
        use super::*;

        fn assert_tiles(len: usize, m: &FileModel) {
            let mut next = 0;
            for ns in &m.namespaces {
                assert_eq!(ns.index, next, "gap or overlap before {:?}", ns.name);
                assert!(ns.body_ends >= ns.index);
                next = ns.body_ends + 1;
            }
            assert_eq!(next, len);
        }

        #[test]
        fn statement_form() {
            let (tokens, m) = model("<?php\nnamespace A;\nclass X {}\nnamespace B\\C;\nclass Y {}\n");
            assert_tiles(tokens.len(), &m);
            let names: Vec<&str> = m.namespaces.iter().map(|n| n.name.as_str()).collect();
            assert_eq!(names, vec!["", "A", "B\\C"]);
            assert_eq!(m.classes[0].name, "A\\X");
            assert_eq!(m.classes[1].name, "B\\C\\Y");
        }

        #[test]
        fn braced_form_with_global_block() {
            let src = "<?php\nnamespace A { class X {} }\nnamespace { class Y {} }\n";
            let (tokens, m) = model(src);
            assert_tiles(tokens.len(), &m);
            let names: Vec<&str> = m.namespaces.iter().map(|n| n.name.as_str()).collect();
            assert_eq!(names, vec!["", "A", "", "", ""]);
            assert_eq!(m.classes[0].name, "A\\X");
            assert_eq!(m.classes[1].name, "Y");
        }

        #[test]
        fn no_namespace_is_one_global_record() {
            let (_, m) = model("<?php class A {}");
            assert!(m.namespaces.len() == 1 && m.namespaces[0].name.is_empty());
        }

        #[test]
        fn relative_namespace_is_not_a_declaration() {
            let (_, m) = model("<?php namespace A; $x = namespace\\f();");
            assert_eq!(m.namespaces.last().map(|n| n.name.as_str()), Some("A"));
            assert_eq!(m.namespaces.len(), 2);
        }

        #[test]
        fn imports() {
            let src = "<?php namespace N;\n\
                       use A\\B;\n\
                       use C\\D as E, \\F\\G;\n\
                       use H\\{I, J\\K as L, function m};\n\
                       use function x\\y;\n\
                       use const Q\\R;\n";
            let (_, m) = model(src);
            let map = &m.namespaces.last().unwrap().import_map;
            assert_eq!(map.get("b").map(String::as_str), Some("A\\B"));
            assert_eq!(map.get("e").map(String::as_str), Some("C\\D"));
            assert_eq!(map.get("g").map(String::as_str), Some("F\\G"));
            assert_eq!(map.get("i").map(String::as_str), Some("H\\I"));
            assert_eq!(map.get("l").map(String::as_str), Some("H\\J\\K"));
            assert!(!map.contains_key("m"));
            assert!(!map.contains_key("y"));
            assert!(!map.contains_key("r"));
            assert_eq!(map.len(), 5);
        }
    }

    mod classes {
        use super::*;

        #[test]
        fn header_lists_are_resolved_after_the_pass() {
            let src = "<?php namespace App;\n\
                       class A extends Base implements \\Countable, I { use T1, Lib\\T2; }\n\
                       use Vendor\\Base;\n";
            let (_, m) = model(src);
            let a = &m.classes[0];
            assert_eq!(a.name, "App\\A");
            // the import below the class still applies
            assert_eq!(a.extends, vec!["Vendor\\Base"]);
            assert_eq!(a.implements, vec!["Countable", "App\\I"]);
            assert_eq!(a.uses, vec!["App\\T1", "App\\Lib\\T2"]);
        }

        #[test]
        fn interface_extends_many() {
            let (_, m) = model("<?php interface I extends J, K {}");
            assert_eq!(m.classes[0].kind, ClassKind::Interface);
            assert_eq!(m.classes[0].extends, vec!["J", "K"]);
        }

        #[test]
        fn modifiers() {
            let (_, m) = model("<?php abstract class A {} final class B {} class C {}");
            assert!(m.classes[0].is_abstract());
            assert!(m.classes[1].is_final());
            assert_eq!(m.classes[2].attributes, Attributes::empty());
        }

        #[test]
        fn anonymous_class() {
            let (_, m) = model("<?php $o = new class($x) extends P { public function f() {} };");
            let c = &m.classes[0];
            assert_eq!(c.name, ANONYMOUS_CLASS_NAME);
            assert_eq!(c.name_index, None);
            assert_eq!(c.extends, vec!["P"]);
            assert_eq!(c.methods.len(), 1);
        }

        #[test]
        fn members() {
            let src = "<?php class A {\n\
                       const X = 1, Y = 2;\n\
                       private static ?int $count = 0, $other;\n\
                       public $plain;\n\
                       var $old;\n\
                       protected function f() {}\n\
                       }";
            let (_, m) = model(src);
            let a = &m.classes[0];
            let consts: Vec<&str> = a.constants.iter().map(|c| c.name.as_str()).collect();
            assert_eq!(consts, vec!["X", "Y"]);

            let props: Vec<(&str, Option<&str>)> = a
                .properties
                .iter()
                .map(|p| (p.name.as_str(), p.type_name.as_deref()))
                .collect();
            assert_eq!(
                props,
                vec![
                    ("$count", Some("?int")),
                    ("$other", Some("?int")),
                    ("$plain", None),
                    ("$old", None),
                ]
            );
            assert!(a.properties[0].attributes.is_private());
            assert!(a.properties[1].attributes.is_static());
            assert!(a.properties[2].attributes.is_public());
            assert!(a.properties[3].attributes.is_public());
            assert!(a.properties.iter().all(|p| p.class_name.as_deref() == Some("A")));

            let f = &m.functions[a.methods[0].index()];
            assert!(f.attributes.is_protected());
            assert!(!f.attributes.is_static());
        }

        #[test]
        fn modifiers_reset_after_each_declaration() {
            let (_, m) = model("<?php class A { static public function f() {} function g() {} }");
            assert!(m.functions[0].attributes.is_static());
            assert_eq!(m.functions[1].attributes, Attributes::empty());
            assert!(m.functions[1].attributes.is_public());
        }

        #[test]
        fn constructor_promotion_adds_properties() {
            let (_, m) = model("<?php class P { public function __construct(private readonly Foo $foo, $plain) {} }");
            let p = &m.classes[0];
            assert_eq!(p.properties.len(), 1);
            assert_eq!(p.properties[0].name, "$foo");
            assert_eq!(p.properties[0].type_name.as_deref(), Some("Foo"));
            assert!(p.properties[0].attributes.is_private());
        }

        #[test]
        fn enum_is_a_class() {
            let (_, m) = model("<?php enum Suit: string { case A = 'a'; public function label() {} }");
            assert_eq!(m.classes[0].name, "Suit");
            assert_eq!(m.classes[0].methods.len(), 1);
            assert!(m.functions[0].is_method());
        }
    }

    mod functions {
        use super::*;

        #[test]
        fn parameters() {
            let src = "<?php namespace N; use X\\Y;\n\
                       function &f(int $a, Y &$b = null, ?\\Z ...$rest) {}";
            let (_, m) = model(src);
            let f = &m.functions[0];
            assert_eq!(f.name.as_deref(), Some("N\\f"));
            assert!(f.returns_reference);
            let p = &f.parameters;
            assert_eq!(p.len(), 3);
            assert_eq!((p[0].name.as_str(), p[0].type_name.as_deref()), ("$a", Some("int")));
            assert_eq!(p[1].type_name.as_deref(), Some("X\\Y"));
            assert!(p[1].is_passed_by_reference && p[1].has_default_value);
            assert_eq!(p[2].type_name.as_deref(), Some("?Z"));
            assert!(p[2].is_variadic && !p[2].has_default_value);
        }

        #[test]
        fn closures_and_use_lists() {
            let src = "<?php class A { function m() { return function ($x) use ($y, &$z): int { }; } }";
            let (_, m) = model(src);
            assert_eq!(m.functions.len(), 2);
            let closure = &m.functions[1];
            assert!(closure.is_closure());
            assert_eq!(closure.class_name.as_deref(), Some("A"));
            let used: Vec<(&str, bool)> = closure
                .used_variables
                .iter()
                .map(|v| (v.name.as_str(), v.is_passed_by_reference))
                .collect();
            assert_eq!(used, vec![("$y", false), ("$z", true)]);
            assert!(m.functions[0].contains(closure.index));
            assert!(m.functions[0].contains(closure.body_ends));
        }

        #[test]
        fn declarations_without_body() {
            let (tokens, m) = model("<?php interface I { public function f(array $a): ?string; }");
            let f = &m.functions[0];
            assert!(f.is_declaration);
            assert_eq!(f.body_starts, None);
            assert!(tokens[f.body_ends].is(";"));
        }

        #[test]
        fn arrow_functions() {
            let (tokens, m) = model("<?php $f = array_map(fn($x) => $x * 2, $list);");
            let f = &m.functions[0];
            assert!(f.is_closure());
            assert_eq!(tokens[f.body_ends].text, "2");
        }

        #[test]
        fn function_and_const_imports_do_not_declare() {
            let (_, m) = model("<?php use function A\\b; use const A\\C; const D = 1;");
            assert!(m.functions.is_empty());
            assert_eq!(m.constants.len(), 1);
            assert_eq!(m.constants[0].name, "D");
        }
    }

    mod types {
        use super::*;

        fn ns() -> Namespace {
            let mut ns = global_record(0);
            ns.name = "N".into();
            ns.import_map.insert("foo".into(), "Lib\\Foo".into());
            ns
        }

        #[test]
        fn builtin_types_are_kept() {
            assert_eq!(resolve_type("?int", &ns()), "?int");
            assert_eq!(resolve_type("self", &ns()), "self");
        }

        #[test]
        fn class_types_are_qualified() {
            assert_eq!(resolve_type("Foo|Bar|null", &ns()), "Lib\\Foo|N\\Bar|null");
            assert_eq!(resolve_type("(Foo&\\C)|false", &ns()), "(Lib\\Foo&C)|false");
        }
    }
}
