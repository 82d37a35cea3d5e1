// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Descriptors used to create compute and render pipelines.

use super::root_layout::PassBindingRequest;
use crate::renderer::api::resource::ImageFormat;
use crate::renderer::traits::ComputeKernel;
use std::borrow::Cow;
use std::sync::Arc;

/// An opaque handle to a compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputePipelineId(pub u64);

/// An opaque handle to a render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPipelineId(pub u64);

/// Describes a compute pipeline.
#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Shader source handed to backends that compile shaders.
    pub shader_source: Cow<'a, str>,
    /// The kernel entry point.
    pub entry_point: Cow<'a, str>,
    /// What the pipeline binds, resolved against the compute root layout.
    pub bindings: PassBindingRequest,
    /// Host implementation executed by backends without a shader compiler.
    pub kernel: Option<Arc<dyn ComputeKernel>>,
}

/// Describes a render pipeline drawing bindless geometry.
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Shader source handed to backends that compile shaders.
    pub shader_source: Cow<'a, str>,
    /// Vertex entry point.
    pub vertex_entry: Cow<'a, str>,
    /// Fragment entry point, if any.
    pub fragment_entry: Option<Cow<'a, str>>,
    /// What the pipeline binds, resolved against the graphics root layout.
    pub bindings: PassBindingRequest,
    /// Color target format.
    pub color_format: Option<ImageFormat>,
    /// Depth target format.
    pub depth_format: Option<ImageFormat>,
}
