//! Typed proxy source generation.
//!
//! A [`ProxyGenerator`] turns a service type and its SCPD into a
//! [`GeneratedProxy`]: Rust source for one typed proxy struct plus the
//! metadata the runtime needs to bind the service without compiling that
//! source. Persisting writes both next to each other:
//!
//! ```text
//! <dir>/cp_proxy_av_openhome_org_volume2.rs
//! <dir>/cp_proxy_av_openhome_org_volume2.json
//! ```
//!
//! The `.rs` file is meant to be compiled into an application ahead of
//! time and registered with a [`crate::ProxyFactory`]; the `.json` sidecar
//! is what [`crate::ProxyLoader`] reads at runtime.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::descriptor::{ServiceType, domain_name};
use crate::errors::GenerationError;
use crate::naming::{proxy_type_name, rust_ident, rust_type_ident, to_snake_case};
use crate::native::{ParameterKind, ParameterSpec};
use crate::scpd::{ActionSpec, ScpdDocument};

/// Everything needed to bind a service without its generated source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyMetadata {
    pub type_name: String,
    pub service_type_urn: String,
    pub service_type: ServiceType,
    pub document: ScpdDocument,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedProxy {
    pub metadata: ProxyMetadata,
    pub source: String,
}

impl GeneratedProxy {
    pub fn type_name(&self) -> &str {
        &self.metadata.type_name
    }

    /// File stem shared by the source and its sidecar.
    pub fn file_stem(&self) -> String {
        to_snake_case(&self.metadata.type_name)
    }
}

/// Produces and stores typed proxies.
///
/// Implementations are shared across threads and may be called
/// concurrently for different services.
pub trait ProxyGenerator: Send + Sync {
    fn generate(&self, service_type: &str, scpd_xml: &str)
    -> Result<GeneratedProxy, GenerationError>;

    /// Writes `proxy` into `target_dir` and returns the path of the source file.
    fn persist(&self, proxy: &GeneratedProxy, target_dir: &Path)
    -> Result<PathBuf, GenerationError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RustProxyGenerator;

impl ProxyGenerator for RustProxyGenerator {
    fn generate(
        &self,
        service_type: &str,
        scpd_xml: &str,
    ) -> Result<GeneratedProxy, GenerationError> {
        let parsed = ServiceType::parse(service_type)
            .map_err(|_| GenerationError::ServiceType(service_type.to_string()))?;
        let document = ScpdDocument::parse(scpd_xml)?;

        let metadata = ProxyMetadata {
            type_name: proxy_type_name(&domain_name(&parsed.domain), &parsed.name, parsed.version),
            service_type_urn: service_type.trim().to_string(),
            service_type: parsed,
            document,
        };
        let source = render(&metadata)?;
        debug!(
            "Generated {} ({} actions, {} properties)",
            metadata.type_name,
            metadata.document.actions.len(),
            metadata.document.properties().count()
        );

        Ok(GeneratedProxy { metadata, source })
    }

    fn persist(
        &self,
        proxy: &GeneratedProxy,
        target_dir: &Path,
    ) -> Result<PathBuf, GenerationError> {
        fs::create_dir_all(target_dir).map_err(|source| GenerationError::Persist {
            path: target_dir.to_path_buf(),
            source,
        })?;

        let stem = proxy.file_stem();
        let source_path = target_dir.join(format!("{}.rs", stem));
        let metadata_path = target_dir.join(format!("{}.json", stem));
        if let Some(existing) = persisted_type_name(&metadata_path) {
            if existing != proxy.type_name() {
                return Err(GenerationError::FileStemCollision {
                    stem,
                    existing,
                    generated: proxy.type_name().to_string(),
                });
            }
        }

        write_atomic(&source_path, proxy.source.as_bytes())?;
        // the sidecar is written last: its presence marks a complete unit
        let metadata = serde_json::to_vec_pretty(&proxy.metadata)?;
        write_atomic(&metadata_path, &metadata)?;

        debug!("Persisted {} to {}", proxy.type_name(), source_path.display());
        Ok(source_path)
    }
}

/// Type name declared by a sidecar already on disk. Unreadable sidecars
/// are treated as absent and get overwritten.
fn persisted_type_name(metadata_path: &Path) -> Option<String> {
    let bytes = fs::read(metadata_path).ok()?;
    serde_json::from_slice::<ProxyMetadata>(&bytes)
        .ok()
        .map(|m| m.type_name)
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), GenerationError> {
    let persist_error = |source| GenerationError::Persist {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut file = NamedTempFile::new_in(dir).map_err(persist_error)?;
    file.write_all(contents).map_err(persist_error)?;
    file.flush().map_err(persist_error)?;
    file.persist(path).map_err(|e| persist_error(e.error))?;
    Ok(())
}

#[derive(Default)]
struct SourceWriter {
    out: String,
}

impl SourceWriter {
    fn line(&mut self, line: impl AsRef<str>) {
        self.out.push_str(line.as_ref());
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }
}

fn input_type(kind: ParameterKind) -> &'static str {
    match kind {
        ParameterKind::String => "&str",
        ParameterKind::Binary => "&[u8]",
        other => other.rust_type(),
    }
}

fn input_value(kind: ParameterKind, ident: &str) -> String {
    match kind {
        ParameterKind::String => format!("ArgumentValue::String({}.to_string())", ident),
        ParameterKind::Binary => format!("ArgumentValue::Binary({}.to_vec())", ident),
        other => format!("ArgumentValue::{}({})", other.name(), ident),
    }
}

fn output_getter(kind: ParameterKind) -> &'static str {
    match kind {
        ParameterKind::Bool => "bool",
        ParameterKind::Int => "int",
        ParameterKind::Uint => "uint",
        ParameterKind::String => "string",
        ParameterKind::Binary => "binary",
    }
}

fn value_getter(kind: ParameterKind) -> &'static str {
    match kind {
        ParameterKind::Bool => "into_bool",
        ParameterKind::Int => "into_int",
        ParameterKind::Uint => "into_uint",
        ParameterKind::String => "into_string",
        ParameterKind::Binary => "into_binary",
    }
}

fn spec_list(params: &[ParameterSpec]) -> String {
    params
        .iter()
        .map(|p| format!("ParameterSpec::new({:?}, ParameterKind::{})", p.name, p.kind.name()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Records that `ident` is generated for `name`; two names sharing one
/// identifier would produce source that does not compile.
fn claim_ident(
    seen: &mut HashMap<String, String>,
    ident: String,
    name: &str,
    what: &str,
) -> Result<(), GenerationError> {
    match seen.insert(ident.clone(), name.to_string()) {
        Some(previous) => Err(GenerationError::Scpd(format!(
            "{} '{}' and '{}' both map to '{}'",
            what, previous, name, ident
        ))),
        None => Ok(()),
    }
}

fn check_identifiers(document: &ScpdDocument) -> Result<(), GenerationError> {
    let mut methods = HashMap::new();
    for action in &document.actions {
        let method = format!("sync_{}", to_snake_case(&action.name));
        claim_ident(&mut methods, method, &action.name, "actions")?;

        let mut params = HashMap::new();
        for input in action.inputs() {
            let what = format!("arguments of {}", action.name);
            claim_ident(&mut params, rust_ident(&input.name), &input.name, &what)?;
        }
    }
    for property in document.properties() {
        let method = format!("property_{}", to_snake_case(&property.name));
        claim_ident(&mut methods, method, &property.name, "properties")?;
    }
    Ok(())
}

fn render(metadata: &ProxyMetadata) -> Result<String, GenerationError> {
    check_identifiers(&metadata.document)?;

    let ty = rust_type_ident(&metadata.type_name);
    let service = &metadata.service_type;
    let document = &metadata.document;
    let mut w = SourceWriter::default();

    w.line(format!(
        "// Proxy for {}, generated from its SCPD. Do not edit.",
        metadata.service_type_urn
    ));
    w.line("#![allow(unused_imports)]");
    w.blank();
    w.line("use std::any::Any;");
    w.line("use std::sync::Arc;");
    w.blank();
    w.line("use pmoohnet::{");
    w.line("    ArgumentValue, CpProxy, Device, ParameterKind, ParameterSpec, ProxyBuilder, ProxyFactory,");
    w.line("    Result, ServiceProxy,");
    w.line("};");
    w.blank();
    w.line(format!("pub struct {} {{", ty));
    w.line("    base: CpProxy,");
    w.line("}");
    w.blank();
    w.line(format!("impl {} {{", ty));
    w.line(format!(
        "    pub const TYPE_NAME: &'static str = {:?};",
        metadata.type_name
    ));
    w.line(format!(
        "    pub const SERVICE_TYPE: &'static str = {:?};",
        metadata.service_type_urn
    ));
    w.blank();
    w.line("    pub fn new(device: &Device) -> Result<Self> {");
    w.line(format!(
        "        let base = ProxyBuilder::new(device, {:?}, {:?}, {})",
        service.domain, service.name, service.version
    ));
    for action in &document.actions {
        w.line(format!(
            "            .action({:?}, vec![{}], vec![{}])",
            action.name,
            spec_list(&action.inputs()),
            spec_list(&action.outputs())
        ));
    }
    for property in document.properties() {
        w.line(format!(
            "            .property({:?}, ParameterKind::{})",
            property.name,
            property.kind.name()
        ));
    }
    w.line("            .build()?;");
    w.line("        Ok(Self { base })");
    w.line("    }");

    for action in &document.actions {
        w.blank();
        render_action(&mut w, action);
    }

    for property in document.properties() {
        w.blank();
        w.line(format!(
            "    pub fn property_{}(&self) -> Result<{}> {{",
            to_snake_case(&property.name),
            property.kind.rust_type()
        ));
        w.line(format!(
            "        self.base.read_property({:?})?.{}({:?})",
            property.name,
            value_getter(property.kind),
            property.name
        ));
        w.line("    }");
    }
    w.line("}");
    w.blank();

    w.line(format!("impl ServiceProxy for {} {{", ty));
    w.line("    fn base(&self) -> &CpProxy {");
    w.line("        &self.base");
    w.line("    }");
    w.blank();
    w.line("    fn type_name(&self) -> &str {");
    w.line("        Self::TYPE_NAME");
    w.line("    }");
    w.blank();
    w.line("    fn service_type(&self) -> &str {");
    w.line("        Self::SERVICE_TYPE");
    w.line("    }");
    w.blank();
    w.line("    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {");
    w.line("        self");
    w.line("    }");
    w.line("}");
    w.blank();

    w.line("pub fn register(factory: &ProxyFactory) {");
    w.line(format!("    factory.register({}::TYPE_NAME, |device| {{", ty));
    w.line(format!(
        "        let proxy: Arc<dyn ServiceProxy> = Arc::new({}::new(device)?);",
        ty
    ));
    w.line("        Ok(proxy)");
    w.line("    });");
    w.line("}");

    Ok(w.out)
}

fn render_action(w: &mut SourceWriter, action: &ActionSpec) {
    let inputs = action.inputs();
    let outputs = action.outputs();

    let params: Vec<String> = inputs
        .iter()
        .map(|p| format!(", {}: {}", rust_ident(&p.name), input_type(p.kind)))
        .collect();
    let returns = match outputs.as_slice() {
        [] => "()".to_string(),
        [single] => single.kind.rust_type().to_string(),
        many => format!(
            "({})",
            many.iter()
                .map(|p| p.kind.rust_type())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let args: Vec<String> = inputs
        .iter()
        .map(|p| format!("({:?}, {})", p.name, input_value(p.kind, &rust_ident(&p.name))))
        .collect();

    w.line(format!(
        "    pub fn sync_{}(&self{}) -> Result<{}> {{",
        to_snake_case(&action.name),
        params.concat(),
        returns
    ));
    let call = format!(
        "self.base.invoke({:?}, &[{}])?",
        action.name,
        args.join(", ")
    );
    match outputs.as_slice() {
        [] => {
            w.line(format!("        {};", call));
            w.line("        Ok(())");
        }
        [single] => {
            w.line(format!("        let mut out = {};", call));
            w.line(format!(
                "        out.{}({:?})",
                output_getter(single.kind),
                single.name
            ));
        }
        many => {
            w.line(format!("        let mut out = {};", call));
            let values: Vec<String> = many
                .iter()
                .map(|p| format!("out.{}({:?})?", output_getter(p.kind), p.name))
                .collect();
            w.line(format!("        Ok(({}))", values.join(", ")));
        }
    }
    w.line("    }");
}
