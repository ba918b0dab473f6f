//! Call extraction from source code using language-specific parsers.
//!
//! Python is the reference dialect, parsed with tree-sitter. Other languages
//! are registered but currently extract nothing. A file that fails to parse
//! yields empty results with a warning; one bad file must never block
//! indexing of a project.

use tree_sitter::{Node, Parser, Tree};

use crate::graph::{CallSite, CallType, FunctionNode, InterfaceImplementation};

/// Language-specific call extraction capability set.
pub trait CallExtractor: Send + Sync {
    /// Every call expression inside a function body, attributed to the
    /// innermost enclosing function.
    fn extract_calls(&self, file_path: &str, source: &str) -> Vec<CallSite>;

    /// One record per (class, base-class) pair.
    fn extract_implementations(&self, file_path: &str, source: &str) -> Vec<InterfaceImplementation>;

    /// Function definitions with their spans and signatures.
    fn extract_functions(&self, file_path: &str, source: &str) -> Vec<FunctionNode>;
}

/// Resolve an extractor by language tag. Unknown languages get `None` and
/// extract nothing rather than failing.
pub fn extractor_for(language: &str) -> Option<Box<dyn CallExtractor>> {
    match language.to_lowercase().as_str() {
        "python" => Some(Box::new(PythonCallExtractor)),
        "javascript" | "typescript" => Some(Box::new(ScriptCallExtractor)),
        other => {
            tracing::debug!(language = other, "no call extractor available for language");
            None
        }
    }
}

// ============================================================================
// PYTHON
// ============================================================================

/// Python call extraction over a tree-sitter parse.
pub struct PythonCallExtractor;

impl PythonCallExtractor {
    fn parse(&self, file_path: &str, source: &str) -> Option<Tree> {
        let mut parser = Parser::new();
        let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
        if parser.set_language(&language).is_err() {
            tracing::warn!(file = file_path, "python grammar rejected by parser");
            return None;
        }
        let tree = parser.parse(source, None)?;
        if tree.root_node().has_error() {
            tracing::warn!(file = file_path, "syntax error parsing file");
            return None;
        }
        Some(tree)
    }
}

impl CallExtractor for PythonCallExtractor {
    fn extract_calls(&self, file_path: &str, source: &str) -> Vec<CallSite> {
        let Some(tree) = self.parse(file_path, source) else {
            return Vec::new();
        };
        let mut calls = Vec::new();
        collect_calls(tree.root_node(), None, None, source, file_path, &mut calls);
        calls
    }

    fn extract_implementations(&self, file_path: &str, source: &str) -> Vec<InterfaceImplementation> {
        let Some(tree) = self.parse(file_path, source) else {
            return Vec::new();
        };
        let mut implementations = Vec::new();
        collect_implementations(tree.root_node(), source, file_path, &mut implementations);
        implementations
    }

    fn extract_functions(&self, file_path: &str, source: &str) -> Vec<FunctionNode> {
        let Some(tree) = self.parse(file_path, source) else {
            return Vec::new();
        };
        let mut functions = Vec::new();
        collect_functions(tree.root_node(), None, source, file_path, &mut functions);
        functions
    }
}

fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// Walk the tree tracking the lexically enclosing class and function. Class
/// context never leaks past the class body; calls belong to the innermost
/// enclosing function.
fn collect_calls(
    node: Node<'_>,
    class_ctx: Option<&str>,
    fn_ctx: Option<&str>,
    source: &str,
    file_path: &str,
    out: &mut Vec<CallSite>,
) {
    match node.kind() {
        "class_definition" => {
            let name = node
                .child_by_field_name("name")
                .map(|n| node_text(n, source).to_string());
            let ctx = name.as_deref().or(class_ctx);
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                collect_calls(child, ctx, fn_ctx, source, file_path, out);
            }
            return;
        }
        "function_definition" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source);
                let qualified = qualify(class_ctx, name);
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    collect_calls(child, class_ctx, Some(&qualified), source, file_path, out);
                }
                return;
            }
        }
        "call" => {
            if let (Some(caller), Some(func)) = (fn_ctx, node.child_by_field_name("function")) {
                if let Some(callee) = callee_name(func, source) {
                    out.push(CallSite {
                        caller_function: caller.to_string(),
                        caller_file: file_path.to_string(),
                        caller_line: node.start_position().row as u32 + 1,
                        callee_function: callee,
                        callee_file: None,
                        call_type: call_type_of(func, source),
                    });
                }
            }
            // keep walking: arguments may contain further calls
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_calls(child, class_ctx, fn_ctx, source, file_path, out);
    }
}

/// Resolve the callee name from a call's function expression.
///
/// - name reference -> bare identifier
/// - attribute on a simple name -> `receiver.attr`
/// - attribute on anything else -> bare `attr`
/// - nested call target -> recurse on the inner function expression
/// - anything else (lambda, subscript, ...) -> no call site
fn callee_name(func: Node<'_>, source: &str) -> Option<String> {
    match func.kind() {
        "identifier" => Some(node_text(func, source).to_string()),
        "attribute" => {
            let object = func.child_by_field_name("object")?;
            let attribute = func.child_by_field_name("attribute")?;
            let attribute_text = node_text(attribute, source);
            if object.kind() == "identifier" {
                Some(format!("{}.{}", node_text(object, source), attribute_text))
            } else {
                Some(attribute_text.to_string())
            }
        }
        "call" => callee_name(func.child_by_field_name("function")?, source),
        "parenthesized_expression" => callee_name(func.named_child(0)?, source),
        _ => None,
    }
}

fn call_type_of(func: Node<'_>, source: &str) -> CallType {
    match func.kind() {
        "identifier" => {
            let text = node_text(func, source);
            if text.chars().next().is_some_and(char::is_uppercase) {
                CallType::Constructor
            } else {
                CallType::Direct
            }
        }
        "attribute" => CallType::Method,
        "lambda" => CallType::Lambda,
        "parenthesized_expression" => func
            .named_child(0)
            .map(|inner| call_type_of(inner, source))
            .unwrap_or(CallType::Direct),
        _ => CallType::Direct,
    }
}

fn qualify(class_ctx: Option<&str>, name: &str) -> String {
    match class_ctx {
        Some(class_name) => format!("{class_name}.{name}"),
        None => name.to_string(),
    }
}

fn collect_implementations(
    node: Node<'_>,
    source: &str,
    file_path: &str,
    out: &mut Vec<InterfaceImplementation>,
) {
    if node.kind() == "class_definition" {
        let class_name = node
            .child_by_field_name("name")
            .map(|n| node_text(n, source).to_string())
            .unwrap_or_default();

        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let methods = class_methods(node, source);
            let mut cursor = superclasses.walk();
            for base in superclasses.named_children(&mut cursor) {
                if let Some(interface_name) = base_name(base, source) {
                    out.push(InterfaceImplementation {
                        interface_name,
                        implementation_name: class_name.clone(),
                        file_path: file_path.to_string(),
                        language: "python".to_string(),
                        methods: methods.clone(),
                    });
                }
            }
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_implementations(child, source, file_path, out);
    }
}

/// Last identifier segment of a base-class expression: `abc.ABC` yields `ABC`.
/// Keyword arguments like `metaclass=...` are not bases.
fn base_name(base: Node<'_>, source: &str) -> Option<String> {
    match base.kind() {
        "identifier" => Some(node_text(base, source).to_string()),
        "attribute" => base
            .child_by_field_name("attribute")
            .map(|n| node_text(n, source).to_string()),
        _ => None,
    }
}

/// Method names defined directly in the class body, in source order.
fn class_methods(class_node: Node<'_>, source: &str) -> Vec<String> {
    let Some(body) = class_node.child_by_field_name("body") else {
        return Vec::new();
    };
    let mut methods = Vec::new();
    let mut cursor = body.walk();
    for statement in body.named_children(&mut cursor) {
        let function = match statement.kind() {
            "function_definition" => Some(statement),
            "decorated_definition" => statement
                .child_by_field_name("definition")
                .filter(|def| def.kind() == "function_definition"),
            _ => None,
        };
        if let Some(function) = function {
            if let Some(name) = function.child_by_field_name("name") {
                methods.push(node_text(name, source).to_string());
            }
        }
    }
    methods
}

fn collect_functions(
    node: Node<'_>,
    class_ctx: Option<&str>,
    source: &str,
    file_path: &str,
    out: &mut Vec<FunctionNode>,
) {
    match node.kind() {
        "class_definition" => {
            let name = node
                .child_by_field_name("name")
                .map(|n| node_text(n, source).to_string());
            let ctx = name.as_deref().or(class_ctx);
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                collect_functions(child, ctx, source, file_path, out);
            }
            return;
        }
        "function_definition" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source).to_string();
                out.push(FunctionNode {
                    qualified_name: qualify(class_ctx, &name),
                    file_path: file_path.to_string(),
                    language: "python".to_string(),
                    start_line: node.start_position().row as u32 + 1,
                    end_line: node.end_position().row as u32 + 1,
                    is_exported: !name.starts_with('_'),
                    is_async: is_async_def(node),
                    parameters: parameter_names(node, source),
                    return_type: node
                        .child_by_field_name("return_type")
                        .map(|n| node_text(n, source).to_string()),
                    name,
                });
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_functions(child, class_ctx, source, file_path, out);
    }
}

fn is_async_def(function: Node<'_>) -> bool {
    let mut cursor = function.walk();
    for child in function.children(&mut cursor) {
        if child.kind() == "async" {
            return true;
        }
        if child.kind() == "def" {
            break;
        }
    }
    false
}

fn parameter_names(function: Node<'_>, source: &str) -> Vec<String> {
    let Some(parameters) = function.child_by_field_name("parameters") else {
        return Vec::new();
    };
    let mut names = Vec::new();
    let mut cursor = parameters.walk();
    for parameter in parameters.named_children(&mut cursor) {
        let name = match parameter.kind() {
            "identifier" => Some(node_text(parameter, source).to_string()),
            "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => parameter
                .named_child(0)
                .filter(|n| n.kind() == "identifier")
                .map(|n| node_text(n, source).to_string()),
            "default_parameter" | "typed_default_parameter" => parameter
                .child_by_field_name("name")
                .map(|n| node_text(n, source).to_string()),
            _ => None,
        };
        if let Some(name) = name {
            names.push(name);
        }
    }
    names
}

// ============================================================================
// JAVASCRIPT / TYPESCRIPT (declared, not yet implemented)
// ============================================================================

/// Placeholder extractor for script languages.
pub struct ScriptCallExtractor;

impl CallExtractor for ScriptCallExtractor {
    fn extract_calls(&self, file_path: &str, _source: &str) -> Vec<CallSite> {
        tracing::warn!(file = file_path, "javascript call extraction not yet implemented");
        Vec::new()
    }

    fn extract_implementations(&self, file_path: &str, _source: &str) -> Vec<InterfaceImplementation> {
        tracing::warn!(
            file = file_path,
            "javascript implementation extraction not yet implemented"
        );
        Vec::new()
    }

    fn extract_functions(&self, file_path: &str, _source: &str) -> Vec<FunctionNode> {
        tracing::warn!(file = file_path, "javascript function extraction not yet implemented");
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"def main(data):
    result = process(data)
    print(f"Result: {result}")
def process(data):
    validated = validate(data)
    return clean(validated) * 2
def validate(data):
    return helper(data) if data else 0
def helper(value):
    return abs(value)
def clean(value):
    return value
"#;

    fn python() -> PythonCallExtractor {
        PythonCallExtractor
    }

    fn has_call(calls: &[CallSite], caller: &str, callee: &str) -> bool {
        calls
            .iter()
            .any(|c| c.caller_function == caller && c.callee_function == callee)
    }

    #[test]
    fn extracts_calls_from_sample_module() {
        let calls = python().extract_calls("sample.py", SAMPLE);

        assert!(has_call(&calls, "main", "process"));
        assert!(has_call(&calls, "main", "print"));
        assert!(has_call(&calls, "process", "validate"));
        assert!(has_call(&calls, "process", "clean"));
        assert!(has_call(&calls, "validate", "helper"));

        let site = calls
            .iter()
            .find(|c| c.callee_function == "process")
            .expect("main calls process");
        assert_eq!(site.caller_file, "sample.py");
        assert_eq!(site.caller_line, 2);
        assert_eq!(site.call_type, CallType::Direct);
        assert!(site.callee_file.is_none());
    }

    #[test]
    fn methods_are_qualified_by_their_class() {
        let source = "class Worker:\n    def run(self):\n        self.step()\n        helper()\n";
        let calls = python().extract_calls("w.py", source);

        assert!(has_call(&calls, "Worker.run", "self.step"));
        assert!(has_call(&calls, "Worker.run", "helper"));
        let method = calls
            .iter()
            .find(|c| c.callee_function == "self.step")
            .expect("method call extracted");
        assert_eq!(method.call_type, CallType::Method);
    }

    #[test]
    fn adjacent_classes_do_not_leak_prefixes() {
        let source = "class First:\n    def fa(self):\n        one()\n\nclass Second:\n    def sb(self):\n        two()\n\ndef free():\n    three()\n";
        let calls = python().extract_calls("c.py", source);

        assert!(has_call(&calls, "First.fa", "one"));
        assert!(has_call(&calls, "Second.sb", "two"));
        assert!(has_call(&calls, "free", "three"));
        assert!(!calls.iter().any(|c| c.caller_function == "First.sb"));
        assert!(!calls.iter().any(|c| c.caller_function == "Second.free"));
    }

    #[test]
    fn callee_resolution_rules() {
        let source = "def f():\n    obj.method()\n    a.b.deep()\n    Widget()\n    factory()()\n";
        let calls = python().extract_calls("r.py", source);

        let by_callee = |name: &str| calls.iter().find(|c| c.callee_function == name);

        assert_eq!(by_callee("obj.method").map(|c| c.call_type), Some(CallType::Method));
        // Attribute access on a non-identifier keeps only the final segment.
        assert_eq!(by_callee("deep").map(|c| c.call_type), Some(CallType::Method));
        assert_eq!(by_callee("Widget").map(|c| c.call_type), Some(CallType::Constructor));
        // f()() recurses to the inner function expression.
        assert!(by_callee("factory").is_some());
    }

    #[test]
    fn nested_functions_attribute_to_innermost() {
        let source = "def outer():\n    def inner():\n        deep_call()\n    inner()\n";
        let calls = python().extract_calls("n.py", source);

        assert!(has_call(&calls, "inner", "deep_call"));
        assert!(has_call(&calls, "outer", "inner"));
        // The nested call is not double-attributed to the outer function.
        assert!(!has_call(&calls, "outer", "deep_call"));
    }

    #[test]
    fn lambda_targets_emit_no_call_site() {
        let source = "def f():\n    (lambda x: x)(5)\n";
        let calls = python().extract_calls("l.py", source);
        assert!(calls.iter().all(|c| c.call_type != CallType::Lambda));
        assert!(!calls.iter().any(|c| c.callee_function.contains("lambda")));
    }

    #[test]
    fn syntax_errors_yield_empty_results() {
        let source = "def broken(:\n    pass\n";
        assert!(python().extract_calls("b.py", source).is_empty());
        assert!(python().extract_implementations("b.py", source).is_empty());
        assert!(python().extract_functions("b.py", source).is_empty());
    }

    #[test]
    fn implementations_keep_last_base_segment() {
        let source = "import abc\n\nclass Store(Base, abc.ABC):\n    def get(self):\n        pass\n    def put(self):\n        pass\n";
        let impls = python().extract_implementations("s.py", source);

        assert_eq!(impls.len(), 2);
        let names: Vec<&str> = impls.iter().map(|i| i.interface_name.as_str()).collect();
        assert!(names.contains(&"Base"));
        assert!(names.contains(&"ABC"));
        for implementation in &impls {
            assert_eq!(implementation.implementation_name, "Store");
            assert_eq!(implementation.language, "python");
            assert_eq!(implementation.methods, vec!["get", "put"]);
        }
    }

    #[test]
    fn extract_functions_reads_signatures() {
        let source =
            "async def fetch(url, timeout=30) -> str:\n    return url\n\nclass Svc:\n    def _hidden(self):\n        pass\n";
        let functions = python().extract_functions("f.py", source);

        let fetch = functions
            .iter()
            .find(|f| f.qualified_name == "fetch")
            .expect("fetch extracted");
        assert!(fetch.is_async);
        assert!(fetch.is_exported);
        assert_eq!(fetch.parameters, vec!["url", "timeout"]);
        assert_eq!(fetch.return_type.as_deref(), Some("str"));
        assert_eq!(fetch.start_line, 1);

        let hidden = functions
            .iter()
            .find(|f| f.qualified_name == "Svc._hidden")
            .expect("method extracted");
        assert!(!hidden.is_exported);
        assert!(!hidden.is_async);
    }

    #[test]
    fn registry_dispatch() {
        assert!(extractor_for("python").is_some());
        assert!(extractor_for("Python").is_some());
        assert!(extractor_for("cobol").is_none());

        let js = extractor_for("javascript").expect("registered");
        assert!(js.extract_calls("x.js", "function f() { g(); }").is_empty());
    }
}
