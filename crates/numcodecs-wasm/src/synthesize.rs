use std::{collections::BTreeMap, sync::Arc};

use serde_json::Value;

use crate::{
    bridge::{ComponentSource, RuntimeBridge},
    class::WasmCodecClass,
    codec::DynCodecType,
    error::{BridgeError, ContractViolation, WasmCodecClassError},
    namespace::CodecNamespace,
};

/// Attribute naming the module, i.e. the namespace, of the requested class.
pub const MODULE_ATTRIBUTE: &str = "module";
/// Attribute with the qualified name of the requested class.
pub const QUALNAME_ATTRIBUTE: &str = "qualname";

#[derive(Debug, Clone)]
/// Request to synthesize a codec class from a binary WebAssembly component,
/// see [`synthesize_codec_class`].
///
/// A valid request has no `bases` and exactly the
/// [`MODULE_ATTRIBUTE`] and [`QUALNAME_ATTRIBUTE`] string `attributes`, so
/// that all behaviour of the synthesized class comes from its component.
pub struct CodecClassRequest {
    /// The declared name of the class
    pub name: String,
    /// The declared base classes, which must be empty
    pub bases: Vec<String>,
    /// The declared class attributes
    pub attributes: BTreeMap<String, Value>,
    /// The binary WebAssembly component
    pub component: ComponentSource,
    /// The codec id that the component must declare, if any
    pub codec_id: Option<String>,
}

impl CodecClassRequest {
    /// Create a valid request for a top-level class `name` inside the
    /// `module`.
    #[must_use]
    pub fn new(
        module: impl Into<String>,
        name: impl Into<String>,
        component: impl Into<ComponentSource>,
    ) -> Self {
        let name = name.into();

        Self {
            attributes: BTreeMap::from([
                (String::from(MODULE_ATTRIBUTE), Value::String(module.into())),
                (String::from(QUALNAME_ATTRIBUTE), Value::String(name.clone())),
            ]),
            name,
            bases: Vec::new(),
            component: component.into(),
            codec_id: None,
        }
    }

    /// Require the component to declare the `codec_id`.
    #[must_use]
    pub fn with_codec_id(mut self, codec_id: impl Into<String>) -> Self {
        self.codec_id = Some(codec_id.into());
        self
    }

    /// Check the shape of the request against the `namespace` it targets,
    /// returning the requested qualified name.
    ///
    /// # Errors
    ///
    /// Errors with a [`ContractViolation`] if the request has any bases,
    /// does not have exactly the [`MODULE_ATTRIBUTE`] and
    /// [`QUALNAME_ATTRIBUTE`] string attributes, or names another module.
    pub fn validate(&self, namespace: &str) -> Result<&str, ContractViolation> {
        if !self.bases.is_empty() {
            return Err(ContractViolation::UnexpectedBases {
                bases: self.bases.clone(),
            });
        }

        if let Some(attribute) = self
            .attributes
            .keys()
            .find(|attribute| !matches!(attribute.as_str(), MODULE_ATTRIBUTE | QUALNAME_ATTRIBUTE))
        {
            return Err(ContractViolation::UnexpectedAttribute {
                attribute: attribute.clone(),
            });
        }

        let module = self.string_attribute(MODULE_ATTRIBUTE)?;
        let qualname = self.string_attribute(QUALNAME_ATTRIBUTE)?;

        if module != namespace {
            return Err(ContractViolation::NamespaceMismatch {
                module: String::from(module),
                namespace: String::from(namespace),
            });
        }

        Ok(qualname)
    }

    fn string_attribute(&self, attribute: &'static str) -> Result<&str, ContractViolation> {
        match self.attributes.get(attribute) {
            Some(Value::String(value)) => Ok(value),
            Some(value) => Err(ContractViolation::NonStringAttribute {
                attribute,
                value: value.clone(),
            }),
            None => Err(ContractViolation::MissingAttribute { attribute }),
        }
    }
}

/// Synthesize a fresh codec class from the binary WebAssembly component of
/// the `request` and register it in the `namespace`.
///
/// The request is validated before the component is read. The component is
/// then loaded and validated through the `bridge`. Finally, the synthesized
/// class, which is named after the component's codec id, must have exactly
/// the declared name and qualified name.
///
/// # Errors
///
/// Errors with
/// - [`WasmCodecClassError::ContractViolation`] if the request is
///   malformed,
/// - [`WasmCodecClassError::InvalidComponent`] if the component cannot be
///   loaded, lacks the codec exports, or declares another codec id than the
///   request,
/// - [`WasmCodecClassError::IdentityMismatch`] if the synthesized class does
///   not have the declared name.
///
/// The namespace is left untouched on error.
pub fn synthesize_codec_class<B: RuntimeBridge>(
    bridge: &Arc<B>,
    namespace: &CodecNamespace<B>,
    request: CodecClassRequest,
) -> Result<WasmCodecClass<B>, WasmCodecClassError> {
    let qualname = String::from(request.validate(namespace.name())?);

    let CodecClassRequest {
        name,
        component,
        codec_id: declared_codec_id,
        ..
    } = request;

    let component = component
        .load()
        .map_err(|source| WasmCodecClassError::InvalidComponent {
            codec_id: Arc::from(declared_codec_id.as_deref().unwrap_or("<unknown>")),
            source,
        })?;

    let class = WasmCodecClass::load(bridge.clone(), String::from(namespace.name()), component)?;

    if let Some(declared_codec_id) = declared_codec_id {
        if declared_codec_id != class.codec_id() {
            return Err(WasmCodecClassError::InvalidComponent {
                codec_id: Arc::from(declared_codec_id.as_str()),
                source: BridgeError::invalid_component(anyhow::anyhow!(
                    "the component declares the codec id {:?} instead",
                    class.codec_id()
                )),
            });
        }
    }

    if class.name() != name || class.qualname() != qualname {
        return Err(WasmCodecClassError::IdentityMismatch {
            declared_name: name,
            declared_qualname: qualname,
            found_name: String::from(class.name()),
            found_qualname: String::from(class.qualname()),
        });
    }

    namespace.register(class.clone());

    Ok(class)
}

/// Create a fresh codec class from the binary WebAssembly `component` and
/// register it in the `namespace`.
///
/// The class is named after the component's codec id, e.g. a component for
/// the `fixed-offset-scale.rs` codec becomes the `FixedOffsetScale` class.
///
/// # Errors
///
/// Errors with [`WasmCodecClassError::InvalidComponent`] if the component
/// cannot be loaded or lacks the codec exports.
pub fn create_codec_class<B: RuntimeBridge>(
    bridge: &Arc<B>,
    namespace: &CodecNamespace<B>,
    component: impl Into<ComponentSource>,
) -> Result<WasmCodecClass<B>, WasmCodecClassError> {
    let component = component
        .into()
        .load()
        .map_err(|source| WasmCodecClassError::InvalidComponent {
            codec_id: Arc::from("<unknown>"),
            source,
        })?;

    let class = WasmCodecClass::load(bridge.clone(), String::from(namespace.name()), component)?;

    namespace.register(class.clone());

    Ok(class)
}
