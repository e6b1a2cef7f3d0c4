// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Object Builders
//!
//! Fluent construction of scripted address spaces.
//!
//! ```rust,ignore
//! let space = AddressSpaceBuilder::standard()
//!     .object(NodeId::OBJECTS_FOLDER, NodeId::string(2, "Plant"), "Plant")
//!     .variable(NodeId::string(2, "Plant"), NodeId::string(2, "Level"), "Level", OpcUaValue::Double(1.0))
//!     .build();
//! ```

use ua104_opcua::{NodeClass, NodeId, NodeIdentifier, OpcUaValue};

use super::mocks::{AddressSpace, MockNode};

/// Namespace 0 `Boolean` data type.
pub const BOOLEAN_TYPE: NodeId = NodeId {
    namespace_index: 0,
    identifier: NodeIdentifier::Numeric(1),
};
/// Namespace 0 `Int32` data type.
pub const INT32_TYPE: NodeId = NodeId {
    namespace_index: 0,
    identifier: NodeIdentifier::Numeric(6),
};
/// Namespace 0 `Double` data type.
pub const DOUBLE_TYPE: NodeId = NodeId {
    namespace_index: 0,
    identifier: NodeIdentifier::Numeric(11),
};

/// Builds an [`AddressSpace`].
#[derive(Debug, Default)]
pub struct AddressSpaceBuilder {
    space: AddressSpace,
}

impl AddressSpaceBuilder {
    /// Starts from an empty space.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Starts from Root, Objects, the server state variable and the three
    /// data type nodes used by [`variable`](Self::variable).
    pub fn standard() -> Self {
        let builder = Self::empty();
        builder
            .space
            .insert(NodeId::ROOT_FOLDER, MockNode::new(NodeClass::Object, 0, "Root"));
        builder
            .space
            .insert(NodeId::OBJECTS_FOLDER, MockNode::new(NodeClass::Object, 0, "Objects"));
        builder.space.link(&NodeId::ROOT_FOLDER, NodeId::OBJECTS_FOLDER);

        let mut state = MockNode::new(NodeClass::Variable, 0, "State");
        state.value = OpcUaValue::Int32(0);
        state.data_type = Some(INT32_TYPE);
        builder.space.insert(NodeId::SERVER_STATUS_STATE, state);

        builder
            .data_type(BOOLEAN_TYPE, "Boolean")
            .data_type(INT32_TYPE, "Int32")
            .data_type(DOUBLE_TYPE, "Double")
    }

    /// Adds a DataType node.
    pub fn data_type(self, node_id: NodeId, name: &str) -> Self {
        self.space.insert(node_id, MockNode::new(NodeClass::DataType, 0, name));
        self
    }

    /// Adds an Object under `parent`.
    pub fn object(self, parent: NodeId, node_id: NodeId, name: &str) -> Self {
        self.node(parent, node_id.clone(), MockNode::new(NodeClass::Object, node_id.namespace_index, name))
    }

    /// Adds a Variable under `parent`; the data type follows the value.
    pub fn variable(self, parent: NodeId, node_id: NodeId, name: &str, value: OpcUaValue) -> Self {
        let mut node = MockNode::new(NodeClass::Variable, node_id.namespace_index, name);
        node.data_type = match value {
            OpcUaValue::Boolean(_) => Some(BOOLEAN_TYPE),
            OpcUaValue::Int32(_) => Some(INT32_TYPE),
            OpcUaValue::Double(_) => Some(DOUBLE_TYPE),
            _ => None,
        };
        node.value = value;
        self.node(parent, node_id, node)
    }

    /// Adds an arbitrary node under `parent`.
    pub fn node(self, parent: NodeId, node_id: NodeId, node: MockNode) -> Self {
        self.space.insert(node_id.clone(), node);
        self.space.link(&parent, node_id);
        self
    }

    /// Adds an extra reference, e.g. a second path or a cycle.
    pub fn reference(self, parent: NodeId, child: NodeId) -> Self {
        self.space.link(&parent, child);
        self
    }

    /// Finishes the space.
    pub fn build(self) -> AddressSpace {
        self.space
    }
}
