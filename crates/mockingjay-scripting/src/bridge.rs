//! Host/script execution boundary

use crate::engine::AstCache;
use crate::error::{Result, ScriptError};
use crate::value::ScriptValue;
use rhai::{Dynamic, Engine, Scope, AST};
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use tracing::trace;

/// How long a bridge lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeLifetime {
    /// Long-lived instance reused by a worker for top-level cycles
    Global,
    /// Fresh instance owned by a single nested cycle
    Isolated,
}

/// Binding environment plus evaluator for one script runtime instance
///
/// Bindings persist across evaluations on the same bridge, as do functions
/// and closures defined by earlier evaluations. Nothing is shared between
/// two bridges except the compiled-AST cache.
pub struct ScriptBridge {
    engine: Engine,
    scope: Scope<'static>,
    lib: AST,
    lifetime: BridgeLifetime,
    cache: Arc<AstCache>,
}

impl ScriptBridge {
    pub(crate) fn new(engine: Engine, lifetime: BridgeLifetime, cache: Arc<AstCache>) -> Self {
        Self {
            engine,
            scope: Scope::new(),
            lib: AST::empty(),
            lifetime,
            cache,
        }
    }

    /// Lifetime policy of this bridge
    pub fn lifetime(&self) -> BridgeLifetime {
        self.lifetime
    }

    /// Bind a host value, replacing any existing binding of that name
    pub fn bind(&mut self, name: &str, value: impl Into<ScriptValue>) {
        let value: ScriptValue = value.into();
        trace!(name, type_name = value.type_name(), "Binding value");
        self.set(name, value.into_dynamic());
    }

    /// Bind a value of a registered native type (shared handles and the like)
    pub fn bind_native<T: Clone + Send + Sync + 'static>(&mut self, name: &str, value: T) {
        trace!(name, "Binding native value");
        self.set(name, Dynamic::from(value));
    }

    /// Bind a registered native value as a constant
    ///
    /// Scripts can read the binding and call its methods and setters, but
    /// assigning to the name fails with a runtime error.
    pub fn bind_constant<T: Clone + Send + Sync + 'static>(&mut self, name: &str, value: T) {
        trace!(name, "Binding constant");
        let _ = self.scope.remove::<Dynamic>(name);
        self.scope.push_constant_dynamic(name.to_string(), Dynamic::from(value));
    }

    /// Bind every entry of a mapping
    pub fn bind_all<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ScriptValue>,
    {
        for (name, value) in entries {
            self.bind(name.as_ref(), value);
        }
    }

    /// Current value of a binding (`Null` when unbound)
    pub fn get(&self, name: &str) -> ScriptValue {
        self.scope
            .get(name)
            .cloned()
            .map(ScriptValue::from_dynamic)
            .unwrap_or(ScriptValue::Null)
    }

    /// Current value of a binding as a registered native type
    pub fn get_native<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Option<T> {
        self.scope.get(name).cloned().and_then(Dynamic::try_cast::<T>)
    }

    /// Whether a binding exists
    pub fn contains(&self, name: &str) -> bool {
        self.scope.contains(name)
    }

    /// Compile and evaluate source text
    pub fn eval(&mut self, source: &str) -> Result<ScriptValue> {
        let ast = self.engine.compile(source)?;
        self.run(ast)
    }

    /// Evaluate a named script resource, reusing its compiled AST when the
    /// source is unchanged
    pub fn eval_named(&mut self, name: &str, source: &str) -> Result<ScriptValue> {
        let ast = self.cache.get_or_compile(&self.engine, name, source)?;
        self.run(ast)
    }

    /// Read a script resource from a stream and evaluate it
    pub fn eval_reader<R: Read>(&mut self, name: &str, mut reader: R) -> Result<ScriptValue> {
        let mut source = String::new();
        reader.read_to_string(&mut source)?;
        self.eval_named(name, &source)
    }

    /// Invoke a callable with positional arguments
    pub fn invoke(&self, target: &ScriptValue, args: Vec<ScriptValue>) -> Result<ScriptValue> {
        let ScriptValue::Function(function) = target else {
            return Err(ScriptError::not_callable(target.type_name()));
        };

        let args: Vec<Dynamic> = args.into_iter().map(ScriptValue::into_dynamic).collect();
        trace!(function = %function, argc = args.len(), "Invoking script function");

        let result: Dynamic = function.fn_ptr().call(&self.engine, &self.lib, args)?;
        Ok(ScriptValue::from_dynamic(result))
    }

    /// Drop every binding and script-defined function
    pub fn reset(&mut self) {
        self.scope.clear();
        self.lib = AST::empty();
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.scope.len()
    }

    /// Whether there are no bindings
    pub fn is_empty(&self) -> bool {
        self.scope.is_empty()
    }

    // constants are replaced rather than updated in place
    fn set(&mut self, name: &str, value: Dynamic) {
        if self.scope.is_constant(name) == Some(true) {
            let _ = self.scope.remove::<Dynamic>(name);
        }
        self.scope.set_value(name.to_string(), value);
    }

    fn run(&mut self, ast: AST) -> Result<ScriptValue> {
        let ast = self.lib.merge(&ast);
        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, &ast)?;
        // keep functions (including closure bodies) for later evaluations and invokes
        self.lib = ast.clone_functions_only();
        Ok(ScriptValue::from_dynamic(result))
    }
}

impl fmt::Debug for ScriptBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptBridge")
            .field("lifetime", &self.lifetime)
            .field("bindings", &self.scope.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BridgeFactory;
    use crate::host::MemberObject;
    use bytes::Bytes;
    use mockingjay_core::Request;
    use std::collections::BTreeMap;

    fn bridge() -> ScriptBridge {
        BridgeFactory::default().global()
    }

    #[test]
    fn test_function_expression_invoke() {
        let mut bridge = bridge();
        let f = bridge.eval("|| ['a', 'b', 'c']").unwrap();
        assert!(f.is_function());

        let result = bridge.invoke(&f, vec![]).unwrap();
        assert_eq!(
            result,
            ScriptValue::from(vec!["a", "b", "c"])
        );
    }

    #[test]
    fn test_closure_with_positional_args() {
        let mut bridge = bridge();
        let add = bridge.eval("|a, b| a + b").unwrap();
        let result = bridge
            .invoke(&add, vec![ScriptValue::Int(1), ScriptValue::Int(2)])
            .unwrap();
        assert_eq!(result, ScriptValue::Int(3));

        let twice = bridge.eval("|x| [x, x]").unwrap();
        let result = bridge.invoke(&twice, vec![ScriptValue::Int(1)]).unwrap();
        assert_eq!(result.to_json(), serde_json::json!([1, 1]));
    }

    #[test]
    fn test_closure_captures_definition_scope() {
        let mut bridge = bridge();
        let add_base = bridge.eval("let base = 10; |x| x + base").unwrap();
        let result = bridge.invoke(&add_base, vec![ScriptValue::Int(5)]).unwrap();
        assert_eq!(result, ScriptValue::Int(15));
    }

    #[test]
    fn test_closure_returns_map() {
        let mut bridge = bridge();
        let f = bridge.eval("|| #{ a: 1 }").unwrap();
        let result = bridge.invoke(&f, vec![]).unwrap();
        assert!(result.is_map());
        assert_eq!(result.as_map().unwrap()["a"], ScriptValue::Int(1));
    }

    #[test]
    fn test_functions_persist_across_evals() {
        let mut bridge = bridge();
        bridge.eval("fn add(a, b) { a + b }").unwrap();
        assert_eq!(bridge.eval("add(1, 2)").unwrap(), ScriptValue::Int(3));

        bridge.eval("let add2 = |a, b| a + b;").unwrap();
        assert_eq!(bridge.eval("add2.call(2, 2)").unwrap(), ScriptValue::Int(4));
        let add2 = bridge.get("add2");
        let result = bridge
            .invoke(&add2, vec![ScriptValue::Int(3), ScriptValue::Int(4)])
            .unwrap();
        assert_eq!(result, ScriptValue::Int(7));
    }

    #[test]
    fn test_invoke_not_callable() {
        let bridge = bridge();
        let err = bridge.invoke(&ScriptValue::Int(1), vec![]).unwrap_err();
        assert!(matches!(err, ScriptError::NotCallable { .. }));
    }

    #[test]
    fn test_script_variables() {
        let mut bridge = bridge();
        bridge.eval("let foo = #{ a: 1 };").unwrap();
        assert_eq!(bridge.eval("foo.a").unwrap(), ScriptValue::Int(1));
    }

    #[test]
    fn test_map_binding() {
        let mut bridge = bridge();
        let mut child = BTreeMap::new();
        child.insert("baz".to_string(), ScriptValue::from("ban"));
        let mut map = BTreeMap::new();
        map.insert("foo".to_string(), ScriptValue::from("bar"));
        map.insert("a".to_string(), ScriptValue::Int(1));
        map.insert("child".to_string(), ScriptValue::Map(child.clone()));
        bridge.bind("map", ScriptValue::Map(map));

        assert_eq!(bridge.eval("map.foo").unwrap(), ScriptValue::from("bar"));
        assert_eq!(bridge.eval("map.a").unwrap(), ScriptValue::Int(1));
        assert_eq!(bridge.eval("map.child").unwrap(), ScriptValue::Map(child));
        assert_eq!(bridge.eval("map.child.baz").unwrap(), ScriptValue::from("ban"));
    }

    #[test]
    fn test_array_mutation_is_visible() {
        let mut bridge = bridge();
        let mut first = BTreeMap::new();
        first.insert("a".to_string(), ScriptValue::Int(1));
        bridge.bind("items", ScriptValue::Array(vec![ScriptValue::Map(first)]));

        bridge.eval("items.push(#{ b: 2 })").unwrap();
        assert_eq!(bridge.eval("items.len()").unwrap(), ScriptValue::Int(2));

        bridge.eval("items.push(#{ c: 3 })").unwrap();
        bridge.eval("items.remove(0)").unwrap();
        let items = bridge.get("items");
        assert_eq!(items.as_array().map(|a| a.len()), Some(2));
    }

    #[test]
    fn test_string_interpolation_reads_current_binding() {
        let mut bridge = bridge();
        bridge.bind("name", "John");
        assert_eq!(
            bridge.eval("`hello ${name}`").unwrap(),
            ScriptValue::from("hello John")
        );

        bridge.bind("name", "Jane");
        assert_eq!(
            bridge.eval("`hello ${name}`").unwrap(),
            ScriptValue::from("hello Jane")
        );
    }

    #[test]
    fn test_booleans() {
        let mut bridge = bridge();
        assert!(!bridge.eval("1 == 2").unwrap().is_true());
        assert!(bridge.eval("1 == 1").unwrap().is_true());
    }

    #[test]
    fn test_host_bytes_pass_through() {
        let mut bridge = bridge();
        let bytes = Bytes::from_static(&[1, 2, 3, 255]);
        let utils = MemberObject::new("Utils")
            .member("testBytes", bytes.clone())
            .into_ref();
        bridge.bind("Utils", utils);

        let value = bridge.eval(r#"Utils["testBytes"]"#).unwrap();
        assert_eq!(value, ScriptValue::Bytes(bytes));
    }

    #[test]
    fn test_host_ref_is_not_a_map() {
        let mut bridge = bridge();
        let host = MemberObject::new("Pojo").member("bar", 0_i64).into_ref();
        bridge.bind("pojo", host.clone());

        let value = bridge.get("pojo");
        assert!(!value.is_map());
        assert_eq!(value, ScriptValue::HostRef(host));
        assert_eq!(bridge.eval(r#"pojo["bar"]"#).unwrap(), ScriptValue::Int(0));
        assert!(bridge.eval(r#"pojo["secret"]"#).is_err());
    }

    #[test]
    fn test_request_object() {
        let mut bridge = bridge();
        let mut request = Request::new("GET", "/index");
        request.set_param("hello", "world");
        bridge.bind_native("request", crate::api::RequestHandle::new(request));

        assert_eq!(
            bridge.eval(r#"request.params["hello"]"#).unwrap(),
            ScriptValue::from(vec!["world"])
        );
        assert_eq!(
            bridge.eval(r#"request.param("hello")"#).unwrap(),
            ScriptValue::from("world")
        );
        assert_eq!(bridge.eval("request.path").unwrap(), ScriptValue::from("index"));
    }

    #[test]
    fn test_constant_binding() {
        let mut bridge = bridge();
        let response = crate::api::ResponseHandle::new(mockingjay_core::Response::default());
        bridge.bind_constant("response", response.clone());

        bridge.eval("response.status = 404;").unwrap();
        assert_eq!(response.read().status, 404);

        let err = bridge.eval("response = 1;").unwrap_err();
        assert!(matches!(err, ScriptError::RuntimeError { .. }));
        assert!(bridge.get_native::<crate::api::ResponseHandle>("response").is_some());

        bridge.bind("response", 1_i64);
        assert_eq!(bridge.get("response"), ScriptValue::Int(1));
    }

    #[test]
    fn test_compile_error() {
        let mut bridge = bridge();
        let err = bridge.eval("let x = ;").unwrap_err();
        assert!(matches!(err, ScriptError::CompilationError { .. }));
    }

    #[test]
    fn test_runtime_error() {
        let mut bridge = bridge();
        let err = bridge.eval("throw \"boom\"").unwrap_err();
        assert!(matches!(err, ScriptError::RuntimeError { .. }));
    }

    #[test]
    fn test_isolated_bridges_do_not_share_bindings() {
        let factory = BridgeFactory::default();
        let mut first = factory.isolated();
        let mut second = factory.isolated();

        first.bind("secret", 42_i64);
        first.eval("let local = 1;").unwrap();

        assert!(!second.contains("secret"));
        assert!(second.eval("local").is_err());
        assert_eq!(first.lifetime(), BridgeLifetime::Isolated);
    }

    #[test]
    fn test_reset_clears_bindings_and_functions() {
        let mut bridge = bridge();
        bridge.bind("x", 1_i64);
        bridge.eval("fn f() { 1 }").unwrap();
        bridge.reset();

        assert!(bridge.is_empty());
        assert!(bridge.eval("f()").is_err());
    }

    #[test]
    fn test_eval_reader() {
        let mut bridge = bridge();
        let source = std::io::Cursor::new("40 + 2");
        assert_eq!(
            bridge.eval_reader("answer.rhai", source).unwrap(),
            ScriptValue::Int(42)
        );
    }
}
