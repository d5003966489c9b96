// crates/of_compute/src/registry.rs

//! RHS 注册表
//!
//! 名称 → [`RhsDefinition`] 的目录。创建时预置四个内置系统：
//!
//! | 名称 | type_id | uniform |
//! |------|---------|---------|
//! | `exponential` | 0 | `lambda` |
//! | `vanderpol` | 1 | `mu` |
//! | `lorenz` | 2 | `sigma`, `rho`, `beta` |
//! | `harmonic` | 3 | `omega_sq` |
//!
//! 片段是 `evaluate_rhs(eq_idx: u32, y_val: f32, t: f32) -> f32` 的 WGSL 函数体，
//! 可以读取 uniform 局部常量、`params` 以及 `current_state(idx)`
//! （上一步的完整状态）。
//!
//! 注册表由计算后端独占持有，不做同步。

use std::collections::BTreeMap;

use crate::error::ComputeError;

/// RHS 定义
#[derive(Debug, Clone, PartialEq)]
pub struct RhsDefinition {
    /// WGSL 函数体
    pub snippet: String,
    /// uniform 名称，顺序即槽位
    pub uniform_names: Vec<String>,
    /// 类型标签
    pub type_id: i32,
    /// 描述
    pub description: String,
}

impl RhsDefinition {
    /// 创建定义
    pub fn new(
        snippet: impl Into<String>,
        uniform_names: &[&str],
        type_id: i32,
        description: impl Into<String>,
    ) -> Self {
        Self {
            snippet: snippet.into(),
            uniform_names: uniform_names.iter().map(|s| s.to_string()).collect(),
            type_id,
            description: description.into(),
        }
    }
}

const EXPONENTIAL: &str = "    return -lambda * y_val;";

const VANDERPOL: &str = r#"    let n_eq = u32(params.n_equations);
    var dydt: f32 = 0.0;
    if (eq_idx % 2u == 0u) {
        // dx/dt = v
        if (eq_idx + 1u < n_eq) {
            dydt = current_state(eq_idx + 1u);
        }
    } else {
        // dv/dt = mu (1 - x^2) v - x
        let x = current_state(eq_idx - 1u);
        dydt = mu * (1.0 - x * x) * y_val - x;
    }
    return dydt;"#;

const LORENZ: &str = r#"    let n_eq = u32(params.n_equations);
    let base = (eq_idx / 3u) * 3u;
    var dydt: f32 = 0.0;
    if (base + 2u < n_eq) {
        let x = current_state(base);
        let y = current_state(base + 1u);
        let z = current_state(base + 2u);
        switch (eq_idx - base) {
            case 0u: { dydt = sigma * (y - x); }
            case 1u: { dydt = x * (rho - z) - y; }
            default: { dydt = x * y - beta * z; }
        }
    }
    return dydt;"#;

const HARMONIC: &str = r#"    let n_eq = u32(params.n_equations);
    var dydt: f32 = 0.0;
    if (eq_idx % 2u == 0u) {
        if (eq_idx + 1u < n_eq) {
            dydt = current_state(eq_idx + 1u);
        }
    } else {
        dydt = -omega_sq * current_state(eq_idx - 1u);
    }
    return dydt;"#;

/// RHS 注册表
#[derive(Debug, Clone)]
pub struct RhsRegistry {
    entries: BTreeMap<String, RhsDefinition>,
}

impl RhsRegistry {
    /// 空注册表
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// 预置内置系统的注册表
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(
            "exponential",
            RhsDefinition::new(EXPONENTIAL, &["lambda"], 0, "Exponential decay: dy/dt = -lambda * y"),
        );
        registry.register(
            "vanderpol",
            RhsDefinition::new(VANDERPOL, &["mu"], 1, "Van der Pol oscillator"),
        );
        registry.register(
            "lorenz",
            RhsDefinition::new(LORENZ, &["sigma", "rho", "beta"], 2, "Lorenz system"),
        );
        registry.register(
            "harmonic",
            RhsDefinition::new(HARMONIC, &["omega_sq"], 3, "Harmonic oscillator"),
        );
        registry
    }

    /// 注册（同名覆盖）
    pub fn register(&mut self, name: impl Into<String>, definition: RhsDefinition) {
        let name = name.into();
        if self.entries.insert(name.clone(), definition).is_some() {
            log::debug!("RHS '{}' 已覆盖", name);
        }
    }

    /// 查找
    pub fn get(&self, name: &str) -> Result<&RhsDefinition, ComputeError> {
        self.entries.get(name).ok_or_else(|| ComputeError::RhsNotFound {
            name: name.to_string(),
        })
    }

    /// 已注册名称（有序）
    pub fn list(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// 是否存在
    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// 条目数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RhsRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_present() {
        let registry = RhsRegistry::default();
        assert_eq!(registry.list(), vec!["exponential", "harmonic", "lorenz", "vanderpol"]);

        let lorenz = registry.get("lorenz").unwrap();
        assert_eq!(lorenz.uniform_names, vec!["sigma", "rho", "beta"]);
        assert_eq!(lorenz.type_id, 2);
        assert_eq!(registry.get("exponential").unwrap().type_id, 0);
        assert_eq!(registry.get("harmonic").unwrap().uniform_names, vec!["omega_sq"]);
    }

    #[test]
    fn test_missing_entry() {
        let registry = RhsRegistry::default();
        assert!(!registry.has("brusselator"));
        let err = registry.get("brusselator").unwrap_err();
        assert!(matches!(err, ComputeError::RhsNotFound { ref name } if name == "brusselator"));
    }

    #[test]
    fn test_last_writer_wins() {
        let mut registry = RhsRegistry::empty();
        assert!(registry.is_empty());
        registry.register("decay", RhsDefinition::new("return -y_val;", &[], 10, "v1"));
        registry.register("decay", RhsDefinition::new("return -k * y_val;", &["k"], 11, "v2"));

        assert_eq!(registry.len(), 1);
        let def = registry.get("decay").unwrap();
        assert_eq!(def.type_id, 11);
        assert_eq!(def.uniform_names, vec!["k"]);
    }

    #[test]
    fn test_snippets_return() {
        let registry = RhsRegistry::default();
        for name in registry.list() {
            assert!(registry.get(name).unwrap().snippet.contains("return"));
        }
    }
}
