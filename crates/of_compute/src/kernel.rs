// crates/of_compute/src/kernel.rs

//! 内核源码生成
//!
//! 模板中恰好包含两个占位符：
//!
//! - `{{USER_UNIFORMS}}`: 替换为 uniform 局部常量声明，每行一个
//!   `let NAME: f32 = params.uniforms[I]u;`
//! - `{{RHS_FUNCTION}}`: 替换为 RHS 片段（`evaluate_rhs` 的函数体）
//!
//! 两个占位符都在原始模板中定位后一次性拼接，替换顺序无关，
//! 片段中即使出现占位符文本也不会被再次展开。

use std::borrow::Cow;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use of_config::BackendConfig;

use crate::error::ComputeError;
use crate::params::MAX_UNIFORMS;
use crate::registry::{RhsDefinition, RhsRegistry};

/// uniform 声明占位符
pub const USER_UNIFORMS_TOKEN: &str = "{{USER_UNIFORMS}}";
/// RHS 函数体占位符
pub const RHS_FUNCTION_TOKEN: &str = "{{RHS_FUNCTION}}";
/// 模板文件名
pub const TEMPLATE_FILE: &str = "euler_template.wgsl";
/// 内核入口点
pub const ENTRY_POINT: &str = "main";
/// 工作组大小常量名，模板中 `@workgroup_size` 引用它
pub const WORKGROUP_SIZE_CONSTANT: &str = "workgroup_size_x";

/// 内嵌模板
pub const EMBEDDED_TEMPLATE: &str = include_str!("kernels/euler_template.wgsl");

/// WGSL 关键字，不能用作 uniform 名称
const WGSL_KEYWORDS: &[&str] = &[
    "alias", "break", "case", "const", "const_assert", "continue", "continuing", "default",
    "diagnostic", "discard", "else", "enable", "false", "fn", "for", "if", "let", "loop",
    "override", "requires", "return", "struct", "switch", "true", "var", "while",
];

/// WGSL 保留字，同样不能用作标识符
const WGSL_RESERVED: &[&str] = &[
    "NULL", "Self", "abstract", "active", "alignas", "alignof", "as", "asm", "asm_fragment",
    "async", "attribute", "auto", "await", "become", "binding_array", "cast", "catch", "class",
    "co_await", "co_return", "co_yield", "coherent", "column_major", "common", "compile",
    "compile_fragment", "concept", "const_cast", "consteval", "constexpr", "constinit", "crate",
    "debugger", "decltype", "delete", "demote", "demote_to_helper", "do", "dynamic_cast", "enum",
    "explicit", "export", "extends", "extern", "external", "fallthrough", "filter", "final",
    "finally", "friend", "from", "fxgroup", "get", "goto", "groupshared", "highp", "impl",
    "implements", "import", "inline", "instanceof", "interface", "layout", "lowp", "macro",
    "macro_rules", "match", "mediump", "meta", "mod", "module", "move", "mut", "mutable",
    "namespace", "new", "nil", "noexcept", "noinline", "nointerpolation", "noperspective", "null",
    "nullptr", "of", "operator", "package", "packoffset", "partition", "pass", "patch",
    "pixelfragment", "precise", "precision", "premerge", "priv", "protected", "pub", "public",
    "readonly", "ref", "regardless", "register", "reinterpret_cast", "require", "resource",
    "restrict", "self", "set", "shared", "sizeof", "smooth", "snorm", "static", "static_assert",
    "static_cast", "std", "subroutine", "super", "target", "template", "this", "thread_local",
    "throw", "trait", "try", "type", "typedef", "typeid", "typename", "typeof", "union", "unless",
    "unorm", "unsafe", "unsized", "use", "using", "varying", "virtual", "volatile", "wgsl",
    "where", "with", "writeonly", "yield",
];

/// 预声明的类型名，用作局部常量会遮蔽类型
const WGSL_TYPE_NAMES: &[&str] = &[
    "bool", "f16", "f32", "i32", "u32", "vec2", "vec3", "vec4", "mat2x2", "mat3x3", "mat4x4",
    "array", "atomic", "ptr", "sampler", "texture_2d",
];

/// 模板内已占用的名称
const TEMPLATE_NAMES: &[&str] = &[
    "eq_idx", "y_val", "t", "params", "state", "timeseries", "time_ctrl", "workgroup_size_x",
    "current_state", "evaluate_rhs", "main", "SystemParams", "TimeControl",
];

/// 工作组大小声明，编译前加在源码最前面
pub fn workgroup_size_declaration(size: u32) -> String {
    format!("const {}: u32 = {}u;\n", WORKGROUP_SIZE_CONSTANT, size)
}

/// 内核缓存键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KernelKey {
    /// 内置 RHS 名称
    Builtin(String),
    /// 自定义片段的内容哈希
    Custom(u64),
}

impl KernelKey {
    /// 自定义片段的键
    pub fn custom(snippet: &str) -> Self {
        Self::Custom(content_hash(snippet))
    }
}

impl std::fmt::Display for KernelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Builtin(name) => write!(f, "{}", name),
            Self::Custom(hash) => write!(f, "custom_{:016x}", hash),
        }
    }
}

/// 片段内容哈希
pub fn content_hash(snippet: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    snippet.hash(&mut hasher);
    hasher.finish()
}

/// 校验 uniform 名称是否为合法 WGSL 标识符
///
/// 拒绝关键字、保留字、预声明类型名以及模板内已占用的名称。
pub fn validate_uniform_name(name: &str) -> Result<(), ComputeError> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    let reserved = name == "_"
        || name.starts_with("__")
        || WGSL_KEYWORDS.contains(&name)
        || WGSL_RESERVED.contains(&name)
        || WGSL_TYPE_NAMES.contains(&name)
        || TEMPLATE_NAMES.contains(&name);

    if head_ok && tail_ok && !reserved {
        Ok(())
    } else {
        Err(ComputeError::InvalidUniformName {
            name: name.to_string(),
        })
    }
}

/// 生成 uniform 声明块
pub fn uniform_declarations(names: &[String]) -> Result<String, ComputeError> {
    if names.len() > MAX_UNIFORMS {
        return Err(ComputeError::TooManyUniforms {
            requested: names.len(),
        });
    }

    let mut block = String::new();
    for (slot, name) in names.iter().enumerate() {
        validate_uniform_name(name)?;
        block.push_str(&format!("    let {}: f32 = params.uniforms[{}u];\n", name, slot));
    }
    Ok(block)
}

/// 定位恰好出现一次的占位符
fn locate(template: &str, token: &'static str) -> Result<usize, ComputeError> {
    let positions: Vec<usize> = template.match_indices(token).map(|(i, _)| i).collect();
    match positions.as_slice() {
        [pos] => Ok(*pos),
        _ => Err(ComputeError::MissingPlaceholder {
            token,
            count: positions.len(),
        }),
    }
}

/// 替换两个占位符，其余文本原样保留
pub fn substitute(template: &str, uniforms: &str, rhs_body: &str) -> Result<String, ComputeError> {
    let mut spans = [
        (locate(template, USER_UNIFORMS_TOKEN)?, USER_UNIFORMS_TOKEN, uniforms),
        (locate(template, RHS_FUNCTION_TOKEN)?, RHS_FUNCTION_TOKEN, rhs_body),
    ];
    spans.sort_by_key(|(pos, _, _)| *pos);

    let mut out = String::with_capacity(template.len() + uniforms.len() + rhs_body.len());
    let mut cursor = 0;
    for (pos, token, replacement) in spans {
        out.push_str(&template[cursor..pos]);
        out.push_str(replacement);
        cursor = pos + token.len();
    }
    out.push_str(&template[cursor..]);
    Ok(out)
}

/// 内核源码生成器
#[derive(Debug, Clone, Default)]
pub struct KernelGenerator {
    template_dir: Option<PathBuf>,
}

impl KernelGenerator {
    /// 使用内嵌模板
    pub fn new() -> Self {
        Self::default()
    }

    /// 从指定目录加载模板
    pub fn with_template_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            template_dir: Some(dir.into()),
        }
    }

    /// 按配置创建
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            template_dir: config.template_dir.clone(),
        }
    }

    /// 模板目录
    pub fn template_dir(&self) -> Option<&Path> {
        self.template_dir.as_deref()
    }

    /// 加载模板
    pub fn load_template(&self) -> Result<Cow<'static, str>, ComputeError> {
        match &self.template_dir {
            None => Ok(Cow::Borrowed(EMBEDDED_TEMPLATE)),
            Some(dir) => {
                let path = dir.join(TEMPLATE_FILE);
                std::fs::read_to_string(&path)
                    .map(Cow::Owned)
                    .map_err(|e| {
                        log::error!("无法读取内核模板 {}: {}", path.display(), e);
                        ComputeError::TemplateNotFound {
                            path: path.display().to_string(),
                        }
                    })
            }
        }
    }

    /// 由 RHS 定义生成内核源码
    pub fn generate(&self, definition: &RhsDefinition) -> Result<String, ComputeError> {
        let template = self.load_template()?;
        let uniforms = uniform_declarations(&definition.uniform_names)?;
        substitute(&template, &uniforms, &definition.snippet)
    }

    /// 由内置 RHS 名称生成
    pub fn generate_from_builtin(
        &self,
        registry: &RhsRegistry,
        name: &str,
    ) -> Result<String, ComputeError> {
        let definition = registry.get(name)?;
        self.generate(definition)
    }

    /// 由自定义片段生成
    ///
    /// 自定义片段没有命名 uniform，直接读取 `params.uniforms[i]`。
    pub fn generate_from_custom(&self, snippet: &str) -> Result<String, ComputeError> {
        let template = self.load_template()?;
        substitute(&template, "", snippet)
    }
}
