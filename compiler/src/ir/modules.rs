//! MIR Modules
//!
//! This module defines the top-level compilation unit: the functions with bodies
//! and the external functions they may call.

use super::{IrFunction, IrFunctionId, IrFunctionSignature};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// MIR module - represents a compilation unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrModule {
    /// Module name
    pub name: String,

    /// Functions defined in this module
    pub functions: IndexMap<IrFunctionId, IrFunction>,

    /// External function declarations
    pub extern_functions: IndexMap<IrFunctionId, IrExternFunction>,

    /// Next available function ID
    pub next_function_id: u32,
}

/// External function declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrExternFunction {
    /// Function ID
    pub id: IrFunctionId,

    /// Function name
    pub name: String,

    /// Function signature
    pub signature: IrFunctionSignature,
}

impl IrModule {
    /// Create a new MIR module
    pub fn new(name: String) -> Self {
        Self {
            name,
            functions: IndexMap::new(),
            extern_functions: IndexMap::new(),
            next_function_id: 0,
        }
    }

    /// Add a function to the module
    pub fn add_function(&mut self, function: IrFunction) -> IrFunctionId {
        let id = function.id;
        self.functions.insert(id, function);
        self.next_function_id = self.next_function_id.max(id.0 + 1);
        id
    }

    /// Allocate a new function ID
    pub fn alloc_function_id(&mut self) -> IrFunctionId {
        let id = IrFunctionId(self.next_function_id);
        self.next_function_id += 1;
        id
    }

    /// Add an external function declaration
    pub fn add_extern_function(&mut self, extern_fn: IrExternFunction) -> IrFunctionId {
        let id = extern_fn.id;
        self.extern_functions.insert(id, extern_fn);
        self.next_function_id = self.next_function_id.max(id.0 + 1);
        id
    }

    /// Name of a defined or external function
    pub fn function_name(&self, id: IrFunctionId) -> Option<&str> {
        self.functions
            .get(&id)
            .map(|f| f.name.as_str())
            .or_else(|| self.extern_functions.get(&id).map(|f| f.name.as_str()))
    }

    /// Get a function by name
    pub fn get_function_by_name(&self, name: &str) -> Option<IrFunctionId> {
        self.functions
            .iter()
            .find(|(_, f)| f.name == name)
            .map(|(id, _)| *id)
    }

    /// Verify module integrity
    pub fn verify(&self) -> Result<(), String> {
        for (id, function) in &self.functions {
            function
                .verify()
                .map_err(|e| format!("Function {} error: {}", id, e))?;
        }
        Ok(())
    }

    /// Serialize the module as pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load a module from JSON, refreshing cached predecessor lists
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let mut module: IrModule = serde_json::from_str(text)?;
        for function in module.functions.values_mut() {
            function.cfg.recompute_predecessors();
        }
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionSignatureBuilder, IrBuilder, IrType};

    #[test]
    fn test_module_creation() {
        let module = IrModule::new("test".to_string());
        assert_eq!(module.name, "test");
        assert!(module.functions.is_empty());
    }

    #[test]
    fn test_json_round_trip() {
        let mut builder = IrBuilder::new("json");
        let sig = FunctionSignatureBuilder::new()
            .param("n", IrType::I64)
            .returns(IrType::I64)
            .build();
        let func_id = builder.start_function("identity", sig);
        let n = builder.current_function().unwrap().get_param_reg(0).unwrap();
        builder.build_return(Some(n)).unwrap();
        builder.finish_function();

        let text = builder.module.to_json().unwrap();
        let reloaded = IrModule::from_json(&text).unwrap();
        assert_eq!(reloaded, builder.module);
        assert_eq!(reloaded.function_name(func_id), Some("identity"));
        assert_eq!(reloaded.get_function_by_name("identity"), Some(func_id));
    }
}
