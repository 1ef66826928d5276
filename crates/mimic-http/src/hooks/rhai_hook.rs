use super::{HeaderValues, HookContext, HookError, HookProgram};
use rhai::{Array, Dynamic, Engine, Map, Scope, AST};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// One scripting session per hook task. Programs of the same task share the
/// engine and the `http` variable, so changes made by one are visible to the next.
pub struct HookSession {
    engine: Engine,
    scope: Scope<'static>,
}

impl HookSession {
    pub fn new(context: &HookContext) -> Self {
        let mut scope = Scope::new();
        scope.push("http", context_to_map(context));
        Self {
            engine: create_engine(),
            scope,
        }
    }

    /// Current `http` value, including changes made by hooks.
    pub fn http(&self) -> Option<Map> {
        self.scope.get_value::<Map>("http")
    }

    fn run(&mut self, ast: &AST) -> Result<(), Box<rhai::EvalAltResult>> {
        self.engine.run_ast_with_scope(&mut self.scope, ast)
    }
}

/// Engine with `print`/`debug` routed to tracing.
pub fn create_engine() -> Engine {
    let mut engine = Engine::new();
    engine.on_print(|text| info!(target: "mimic::hook", "{text}"));
    engine.on_debug(|text, source, pos| {
        debug!(target: "mimic::hook", source = source.unwrap_or("hook"), %pos, "{text}")
    });
    engine
}

/// Rhai script compiled once at startup.
#[derive(Clone)]
pub struct RhaiHook {
    name: String,
    ast: Arc<AST>,
}

impl RhaiHook {
    pub fn compile(name: impl Into<String>, source: &str) -> Result<Self, HookError> {
        let name = name.into();
        let ast = create_engine()
            .compile(source)
            .map_err(|e| HookError::Compile {
                name: name.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            name,
            ast: Arc::new(ast),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, HookError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| HookError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::compile(path.display().to_string(), &source)
    }
}

impl HookProgram for RhaiHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, session: &mut HookSession) -> Result<(), HookError> {
        session.run(&self.ast).map_err(|e| HookError::Runtime {
            name: self.name.clone(),
            message: e.to_string(),
        })
    }
}

fn context_to_map(context: &HookContext) -> Map {
    let request = &context.request;
    let mut request_map = Map::new();
    request_map.insert("method".into(), Dynamic::from(request.method.clone()));
    request_map.insert("path".into(), Dynamic::from(request.path.clone()));
    request_map.insert("protocol".into(), Dynamic::from(request.protocol.clone()));
    request_map.insert(
        "parameters".into(),
        Dynamic::from_map(values_to_map(&request.parameters)),
    );
    request_map.insert(
        "body".into(),
        Dynamic::from(String::from_utf8_lossy(&request.body).into_owned()),
    );
    request_map.insert(
        "headers".into(),
        Dynamic::from_map(values_to_map(&request.headers)),
    );

    let response = &context.response;
    let mut response_map = Map::new();
    response_map.insert(
        "body".into(),
        Dynamic::from(String::from_utf8_lossy(&response.body).into_owned()),
    );
    response_map.insert(
        "headers".into(),
        Dynamic::from_map(values_to_map(&response.headers)),
    );
    response_map.insert("status".into(), Dynamic::from(i64::from(response.status)));
    response_map.insert("message".into(), Dynamic::from(response.message.clone()));
    response_map.insert("protocol".into(), Dynamic::from(response.protocol.clone()));

    let mut http = Map::new();
    http.insert("request".into(), Dynamic::from_map(request_map));
    http.insert("response".into(), Dynamic::from_map(response_map));
    http
}

fn values_to_map(values: &HeaderValues) -> Map {
    values
        .iter()
        .map(|(name, list)| {
            let array: Array = list.iter().cloned().map(Dynamic::from).collect();
            (name.as_str().into(), Dynamic::from_array(array))
        })
        .collect()
}
