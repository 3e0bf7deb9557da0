//! Parsed-file model built from real PHP sources.

use xref_core::parsed_file::ParsedFile;
use xref_core::plugin::FileParser;
use xref_php::PhpParser;

fn parse(src: &str) -> ParsedFile {
    PhpParser::new().parse(src.as_bytes(), "a.php").unwrap()
}

fn index_of(pf: &ParsedFile, text: &str) -> usize {
    pf.tokens()
        .iter()
        .position(|t| t.text == text)
        .unwrap_or_else(|| panic!("no token {:?}", text))
}

const SOURCES: &[&str] = &[
    "<?php class A extends B { public function f() {} }",
    "<?php\nnamespace App\\Model;\n\nuse Lib\\Base as Parent_;\n\nclass User extends Parent_ implements \\JsonSerializable {\n    private array $roles = [];\n    public function __construct(private int $id) { parent::__construct(); }\n    public function jsonSerialize(): mixed { return ['id' => $this->id, 'roles' => $this->roles]; }\n}\n",
    "<?php\nnamespace A { function f() { return function ($x) use (&$y) { return [$x, $y]; }; } }\nnamespace B { interface I { const X = 1; } }\nnamespace { echo (1 + (2 * 3)); }\n",
    "<?php\nfunction g(array $a = [], ...$rest) {\n  foreach ($a as $k => $v) { if ($v) { $rest[] = $k; } }\n  return $rest;\n}\n?>\n<p><?= g([1]) ?></p>\n",
    "",
    "<?php\nclass Repo {\n    public function all(array $rows) {\n        $adder = fn($x) => fn($y) => $x + $y;\n        return array_map(function ($row) use ($adder) { return $adder($row)(1); }, $rows);\n    }\n}\nfunction outer() { return new class { public function m() { return fn() => 1; } }; }\n",
];

/// Two inclusive extents either share no token or one contains the other.
fn nested_or_disjoint(a: (usize, usize), b: (usize, usize)) -> bool {
    a.1 < b.0 || b.1 < a.0 || (a.0 <= b.0 && b.1 <= a.1) || (b.0 <= a.0 && a.1 <= b.1)
}

#[test]
fn class_with_parent_and_method() {
    let pf = parse("<?php class A extends B { public function f() {} }");

    assert_eq!(pf.classes().len(), 1);
    let class = &pf.classes()[0];
    assert_eq!(class.name, "A");
    assert_eq!(class.extends, vec!["B"]);
    assert!(class.implements.is_empty());
    assert_eq!(pf.paired_bracket(class.body_starts), Some(class.body_ends));

    let methods: Vec<_> = pf.methods_of(class).collect();
    assert_eq!(methods.len(), 1);
    assert_eq!(methods[0].name.as_deref(), Some("f"));
    assert_eq!(methods[0].class_name.as_deref(), Some("A"));
    assert!(methods[0].is_method());
    assert!(methods[0].parameters.is_empty());
    assert!(class.contains(methods[0].index));
}

#[test]
fn namespace_records_tile_the_file() {
    for src in SOURCES.iter().filter(|s| !s.is_empty()) {
        let pf = parse(src);
        let namespaces = pf.namespaces();
        assert!(!namespaces.is_empty(), "{}", src);
        assert_eq!(namespaces[0].index, 0, "{}", src);
        for pair in namespaces.windows(2) {
            assert_eq!(pair[0].body_ends + 1, pair[1].index, "{}", src);
        }
        assert_eq!(namespaces.last().unwrap().body_ends, pf.len() - 1, "{}", src);
    }
}

#[test]
fn every_declaration_lies_in_its_namespace() {
    let pf = parse(SOURCES[2]);
    let names: Vec<&str> = pf.namespaces().iter().map(|ns| ns.name.as_str()).collect();
    assert!(names.contains(&"A") && names.contains(&"B"));

    for function in pf.functions().iter().filter(|f| !f.is_closure()) {
        let ns = pf.namespace_at(function.index);
        assert!(ns.contains(function.index));
        assert!(ns.contains(function.body_ends));
    }
    assert_eq!(pf.functions()[0].name.as_deref(), Some("A\\f"));
    assert_eq!(pf.classes()[0].name, "B\\I");
    assert_eq!(pf.classes()[0].constants[0].class_name.as_deref(), Some("B\\I"));
}

#[test]
fn function_and_class_extents_never_overlap() {
    for src in SOURCES {
        let pf = parse(src);
        let functions: Vec<(usize, usize)> = pf.functions().iter().map(|f| (f.index, f.body_ends)).collect();
        let classes: Vec<(usize, usize)> = pf.classes().iter().map(|c| (c.index, c.body_ends)).collect();
        for extents in [&functions, &classes] {
            for (i, a) in extents.iter().enumerate() {
                assert!(a.0 <= a.1, "{}", src);
                for b in &extents[i + 1..] {
                    assert!(nested_or_disjoint(*a, *b), "{:?} and {:?} in {}", a, b, src);
                }
            }
        }
    }
}

#[test]
fn nested_closures_own_their_tokens() {
    let pf = parse(SOURCES[5]);
    assert_eq!(pf.classes().len(), 2);

    let inner = pf.function_at(index_of(&pf, "$y")).unwrap();
    assert!(inner.is_closure());
    assert_eq!(inner.parameters[0].name, "$y");
    let outer = pf.function_at(index_of(&pf, "$x")).unwrap();
    assert_eq!(outer.parameters[0].name, "$x");
    assert!(outer.index < inner.index && inner.body_ends <= outer.body_ends);

    let row = index_of(&pf, "$row");
    let closure = pf.function_at(row).unwrap();
    assert!(closure.is_closure());
    assert_eq!(closure.used_variables[0].name, "$adder");
    assert_eq!(pf.class_at(row).map(|c| c.name.as_str()), Some("Repo"));

    let method = pf.functions().iter().find(|f| f.name.as_deref() == Some("all")).unwrap();
    assert!(method.index < closure.index && closure.body_ends < method.body_ends);
}

#[test]
fn bracket_pairing_is_an_involution() {
    for src in SOURCES {
        let pf = parse(src);
        for token in pf.tokens() {
            match pf.paired_bracket(token.index) {
                Some(other) => {
                    assert_ne!(other, token.index);
                    assert_eq!(pf.paired_bracket(other), Some(token.index), "{}", src);
                }
                None => assert!(!token.is_open_bracket() && !token.is_close_bracket()),
            }
        }
    }
}

#[test]
fn imports_and_namespace_relative_names() {
    let pf = parse(SOURCES[1]);
    let class = &pf.classes()[0];
    assert_eq!(class.name, "App\\Model\\User");
    assert_eq!(class.extends, vec!["Lib\\Base"]);
    assert_eq!(class.implements, vec!["JsonSerializable"]);

    let at = class.index;
    assert_eq!(pf.qualify_name("Other", at), "App\\Model\\Other");
    assert_eq!(pf.qualify_name("parent_\\Sub", at), "Lib\\Base\\Sub");
    assert_eq!(pf.qualify_name("namespace\\Sub", at), "App\\Model\\Sub");
}

#[test]
fn leading_separator_is_stripped_and_requalifying_it_is_stable() {
    let pf = parse(SOURCES[1]);
    let at = pf.classes()[0].index;
    for name in ["\\Vendor\\Thing", "\\Thing"] {
        let once = pf.qualify_name(name, at);
        assert_eq!(once, name.trim_start_matches('\\'));
        assert_eq!(pf.qualify_name(&format!("\\{}", once), at), once);
    }
    // the stripped result reads as relative again inside a namespace
    assert_eq!(pf.qualify_name("Thing", at), "App\\Model\\Thing");
}

#[test]
fn promoted_constructor_parameters_are_properties() {
    let pf = parse(SOURCES[1]);
    let class = &pf.classes()[0];
    let names: Vec<&str> = class.properties.iter().map(|p| p.name.as_str()).collect();
    assert!(names.contains(&"$roles"));
    assert!(names.contains(&"$id"));
}

#[test]
fn parameter_lists() {
    let pf = parse(SOURCES[3]);
    let g = &pf.functions()[0];
    assert_eq!(g.name.as_deref(), Some("g"));
    let params: Vec<(&str, bool, bool)> = g
        .parameters
        .iter()
        .map(|p| (p.name.as_str(), p.has_default_value, p.is_variadic))
        .collect();
    assert_eq!(params, vec![("$a", true, false), ("$rest", false, true)]);
    assert_eq!(g.parameters[0].type_name.as_deref(), Some("array"));
    assert!(pf.functions().iter().all(|f| !f.is_closure()));

    let pf = parse(SOURCES[2]);
    let closure = pf.functions().iter().find(|f| f.is_closure()).unwrap();
    assert_eq!(closure.parameters[0].name, "$x");
    assert_eq!(closure.used_variables[0].name, "$y");
    assert!(closure.used_variables[0].is_passed_by_reference);
}

#[test]
fn extract_list_on_real_code() {
    let pf = parse("<?php function foo($a, $b = [1, 2], &$c) {}\nfor ($i = 0; $i < 10; ++$i) {}\nbar();");
    let text = |i: usize| pf.tokens()[i].text.as_str();

    let open = index_of(&pf, "(");
    let params: Vec<&str> = pf.extract_list(open + 1, ",", ")").into_iter().map(text).collect();
    assert_eq!(params, vec!["$a", "$b", "&"]);

    let for_kw = index_of(&pf, "for");
    let for_open = pf.next_non_space(for_kw).unwrap().index;
    let clauses: Vec<&str> = pf.extract_list(for_open + 1, ";", ")").into_iter().map(text).collect();
    assert_eq!(clauses, vec!["$i", "$i", "++"]);

    let bar = index_of(&pf, "bar");
    let bar_open = pf.next_non_space(bar).unwrap().index;
    assert!(pf.extract_list(bar_open + 1, ",", ")").is_empty());
}

#[test]
fn line_numbers_follow_newlines_in_tokens() {
    let src = "<?php\n/* one\n   two */\n$s = \"a\nb\";\n$t = 1;\n";
    let pf = parse(src);
    let t = index_of(&pf, "$t");
    assert_eq!(pf.line_number_at(t), 6);
    let rebuilt: String = pf.tokens().iter().map(|t| t.text.as_str()).collect();
    assert_eq!(rebuilt, src);
}
