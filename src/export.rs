//! Emission of the chunked binary model and animation streams.

use std::time::Duration;

use indexmap::IndexSet;
use thiserror::Error as ThisError;

use crate::{
    Attribute, Element,
    attribute::{Quaternion, Vector2, Vector3},
    skeleton,
};

// stored integer time units per second in version 1 documents
const TIME_UNITS_PER_SECOND: f32 = 10_000.0;

#[derive(Debug, ThisError)]
pub enum ExportError {
    #[error("Could Not Find Skeleton")]
    MissingSkeleton,
    #[error("Animation Unsupported For Format Version: {0}")]
    UnsupportedVersion(i32),
    #[error("Nothing To Export")]
    NothingToExport,
}

/// Role of a node in the scene graph, determined once from its class tag
/// and matched exhaustively during emission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeRole {
    Model,
    Joint,
    Dag,
    Mesh,
    Attachment,
    Transform,
    Channel,
    Other,
}

impl NodeRole {
    pub fn of(element: &Element) -> Self {
        match element.get_class().as_str() {
            "DmeModel" => Self::Model,
            "DmeJoint" => Self::Joint,
            "DmeDag" => Self::Dag,
            "DmeMesh" => Self::Mesh,
            "DmeAttachment" => Self::Attachment,
            "DmeTransform" => Self::Transform,
            "DmeChannel" => Self::Channel,
            _ => Self::Other,
        }
    }
}

/// Append only byte sink for the chunk stream. Multi byte scalars are
/// written native endian; strings carry a length prefix and no terminator.
struct ChunkWriter {
    buffer: Vec<u8>,
}

impl ChunkWriter {
    fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn write_tag(&mut self, tag: &str) {
        self.buffer.extend_from_slice(tag.as_bytes());
    }

    fn write_byte(&mut self, value: u8) {
        self.buffer.push(value);
    }

    fn write_bool(&mut self, value: bool) {
        self.buffer.push(value as u8);
    }

    fn write_int(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_ne_bytes());
    }

    fn write_float(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_ne_bytes());
    }

    fn write_name(&mut self, name: &str) {
        self.write_int(name.len() as i32);
        self.buffer.extend_from_slice(name.as_bytes());
    }

    fn write_vector2(&mut self, value: Vector2) {
        self.write_float(value.x);
        self.write_float(value.y);
    }

    fn write_vector3(&mut self, value: Vector3) {
        self.write_float(value.x);
        self.write_float(value.y);
        self.write_float(value.z);
    }

    fn write_quaternion(&mut self, value: Quaternion) {
        self.write_float(value.x);
        self.write_float(value.y);
        self.write_float(value.z);
        self.write_float(value.w);
    }
}

fn cloned<V>(element: &Element, name: &str) -> Option<V>
where
    V: Clone,
    for<'a> &'a V: TryFrom<&'a Attribute>,
{
    element.get_value::<V>(name).map(|value| (*value).clone())
}

fn write_transform(writer: &mut ChunkWriter, transform: Option<&Element>) {
    let Some(transform) = transform else { return };
    if NodeRole::of(transform) != NodeRole::Transform {
        return;
    }

    writer.write_tag("TRFM");
    writer.write_vector3(cloned::<Vector3>(transform, "position").unwrap_or_default());
    writer.write_quaternion(cloned::<Quaternion>(transform, "orientation").unwrap_or_default());
}

fn write_attachment(writer: &mut ChunkWriter, dag: &Element) {
    let Some(shape) = dag.get_element("shape") else { return };

    writer.write_tag("ATCH");
    writer.write_name(shape.get_name().as_str());
    writer.write_bool(cloned::<bool>(&shape, "isRigid").unwrap_or_default());
    writer.write_bool(cloned::<bool>(&shape, "isWorldAligned").unwrap_or_default());
    write_transform(writer, dag.get_element("transform").as_ref());
}

fn write_mesh_shape(writer: &mut ChunkWriter, mesh: &Element) {
    let state = mesh.get_element("currentState");

    writer.write_tag("MESH");
    writer.write_name(mesh.get_name().as_str());
    write_transform(writer, mesh.get_element("transform").as_ref());

    let positions = state.as_ref().and_then(|state| cloned::<Vec<Vector3>>(state, "positions")).unwrap_or_default();
    let position_indices = state
        .as_ref()
        .and_then(|state| cloned::<Vec<i32>>(state, "positionsIndices"))
        .unwrap_or_default();

    // the vertex count is the length of the index buffer, not the pool
    let vertices = position_indices.len();

    writer.write_tag("VERT");
    writer.write_int(vertices as i32);
    for index in &position_indices {
        writer.write_vector3(positions.get(*index as usize).copied().unwrap_or_default());
    }

    let normals = state.as_ref().and_then(|state| cloned::<Vec<Vector3>>(state, "normals")).unwrap_or_default();
    let normal_indices = state
        .as_ref()
        .and_then(|state| cloned::<Vec<i32>>(state, "normalsIndices"))
        .unwrap_or_default();

    writer.write_tag("NORM");
    for corner in 0..vertices {
        let index = normal_indices.get(corner).copied().unwrap_or_default();
        writer.write_vector3(normals.get(index as usize).copied().unwrap_or_default());
    }

    for face_set in mesh.get_element_array("faceSets") {
        writer.write_tag("FACE");

        let material_name = face_set
            .get_element("material")
            .and_then(|material| cloned::<String>(&material, "mtlName"))
            .unwrap_or_default();
        writer.write_name(&material_name);

        let faces = cloned::<Vec<i32>>(&face_set, "faces").unwrap_or_default();
        writer.write_int(faces.len() as i32);
        for face in faces {
            writer.write_int(face);
        }
    }

    let coordinates = state
        .as_ref()
        .and_then(|state| cloned::<Vec<Vector2>>(state, "textureCoordinates"))
        .unwrap_or_default();
    let coordinate_indices = state
        .as_ref()
        .and_then(|state| cloned::<Vec<i32>>(state, "textureCoordinatesIndices"))
        .unwrap_or_default();

    writer.write_tag("TEXC");
    for corner in 0..vertices {
        let index = coordinate_indices.get(corner).copied().unwrap_or_default();
        writer.write_vector2(coordinates.get(index as usize).copied().unwrap_or_default());
    }

    let weights_per_vertex = state.as_ref().and_then(|state| cloned::<i32>(state, "jointCount")).unwrap_or_default();
    if weights_per_vertex > 0 {
        writer.write_tag("WMAP");
        writer.write_int(weights_per_vertex);

        let weights = state.as_ref().and_then(|state| cloned::<Vec<f32>>(state, "jointWeights")).unwrap_or_default();
        let weight_indices = state
            .as_ref()
            .and_then(|state| cloned::<Vec<i32>>(state, "jointIndices"))
            .unwrap_or_default();

        // weight blocks are addressed by the position pool index
        for index in &position_indices {
            let mut cursor = *index as usize * weights_per_vertex as usize;
            for _ in 0..weights_per_vertex {
                writer.write_float(weights.get(cursor).copied().unwrap_or_default());
                writer.write_int(weight_indices.get(cursor).copied().unwrap_or_default());
                cursor += 1;
            }
        }
    }
}

#[derive(Debug)]
pub enum ExportOutput {
    Model(Vec<u8>),
    Animations(Vec<Vec<u8>>),
    /// The document had a model element with nothing exportable in it.
    Skipped,
}

/// One conversion run over a decoded document.
///
/// The joint ordering is resolved once and cached for the lifetime of the
/// exporter; the visited joint set lives for a single emit call. Nothing is
/// shared between exporters, so concurrent conversions stay independent.
pub struct Exporter {
    root: Element,
    version: i32,
    joints: Option<Vec<Element>>,
    written: IndexSet<Element>,
}

impl Exporter {
    pub fn new(root: Element, version: i32) -> Self {
        Self {
            root,
            version,
            joints: None,
            written: IndexSet::new(),
        }
    }

    /// Returns the canonical joint ordering for the document's skeleton,
    /// resolving it on first use.
    pub fn joint_order(&mut self) -> Result<&[Element], ExportError> {
        if self.joints.is_none() {
            let skeleton = self.root.get_element("skeleton").ok_or(ExportError::MissingSkeleton)?;
            self.joints = Some(skeleton::resolve_joint_order(&skeleton));
        }

        Ok(self.joints.as_deref().unwrap_or_default())
    }

    /// Writes a model element into a chunk stream. Returns None when the
    /// model carries no joint or mesh content at all, in which case the
    /// export is skipped rather than failed.
    pub fn export_model(&mut self, model: &Element) -> Result<Option<Vec<u8>>, ExportError> {
        self.written.clear();

        let children = model.get_element_array("children");
        let has_content = children
            .iter()
            .any(|child| matches!(NodeRole::of(child), NodeRole::Joint | NodeRole::Dag | NodeRole::Mesh));
        if !has_content {
            return Ok(None);
        }

        let mut writer = ChunkWriter::new();
        self.write_header(&mut writer, model);
        write_transform(&mut writer, model.get_element("transform").as_ref());
        self.write_skeleton(&mut writer, model, false)?;

        for child in children {
            match NodeRole::of(&child) {
                NodeRole::Dag | NodeRole::Mesh => self.write_mesh(&mut writer, &child)?,
                _ => {}
            }
        }

        Ok(Some(writer.into_bytes()))
    }

    /// Writes one animation element into a chunk stream. An animation is
    /// meaningless without bone ids, so a missing or empty skeleton fails
    /// the export.
    pub fn export_animation(&mut self, animation: &Element) -> Result<Vec<u8>, ExportError> {
        self.written.clear();

        let skeleton = self.root.get_element("skeleton").ok_or(ExportError::MissingSkeleton)?;

        let mut writer = ChunkWriter::new();
        self.write_header(&mut writer, animation);

        let had_bones = self.write_skeleton(&mut writer, &skeleton, true)?;
        if !had_bones {
            return Err(if self.version <= 18 {
                ExportError::MissingSkeleton
            } else {
                ExportError::UnsupportedVersion(self.version)
            });
        }

        writer.write_tag("ANIM");

        let time_frame = animation.get_element("timeFrame");
        let frame_rate = cloned::<i32>(animation, "frameRate").unwrap_or_default() as f32;
        let scale = time_frame.as_ref().and_then(|frame| cloned::<f32>(frame, "scale")).unwrap_or_default();
        writer.write_float(frame_rate * scale);

        let duration = if self.version <= 1 {
            time_frame.as_ref().and_then(|frame| cloned::<i32>(frame, "durationTime")).unwrap_or_default() as f32 / TIME_UNITS_PER_SECOND
        } else {
            time_frame
                .as_ref()
                .and_then(|frame| cloned::<Duration>(frame, "duration"))
                .unwrap_or_default()
                .as_secs_f32()
        };
        writer.write_float(duration);

        let joints = self.joint_order()?.to_vec();

        for channel in animation.get_element_array("channels") {
            let Some(target_attribute) = cloned::<String>(&channel, "toAttribute") else { continue };
            let kind = match target_attribute.as_str() {
                "position" => b'p',
                "orientation" => b'o',
                _ => continue,
            };

            let Some(target) = channel.get_element("toElement") else { continue };
            let Some(owner) = skeleton::find_child_by_transform(&skeleton, &target) else { continue };
            if NodeRole::of(&owner) != NodeRole::Joint {
                continue;
            }

            // bone ids resolve through the joint ordering by transform
            // reference, never by name
            let bone = joints
                .iter()
                .position(|joint| NodeRole::of(joint) == NodeRole::Joint && joint.get_element("transform").as_ref() == Some(&target));
            let Some(bone) = bone else { continue };

            writer.write_tag("CHAN");
            writer.write_byte(kind);
            writer.write_int(bone as i32);

            let layers = channel.get_element("log").map(|log| log.get_element_array("layers")).unwrap_or_default();
            writer.write_int(layers.len() as i32);

            for layer in layers {
                writer.write_tag("L");

                let times: Vec<f32> = if self.version <= 1 {
                    cloned::<Vec<i32>>(&layer, "times")
                        .unwrap_or_default()
                        .into_iter()
                        .map(|time| time as f32 / TIME_UNITS_PER_SECOND)
                        .collect()
                } else {
                    cloned::<Vec<Duration>>(&layer, "times")
                        .unwrap_or_default()
                        .into_iter()
                        .map(|time| time.as_secs_f32())
                        .collect()
                };

                writer.write_int(times.len() as i32);

                match kind {
                    b'p' => {
                        let values = cloned::<Vec<Vector3>>(&layer, "values").unwrap_or_default();
                        for (frame, time) in times.into_iter().enumerate() {
                            writer.write_float(time);
                            writer.write_vector3(values.get(frame).copied().unwrap_or_default());
                        }
                    }
                    _ => {
                        let values = cloned::<Vec<Quaternion>>(&layer, "values").unwrap_or_default();
                        for (frame, time) in times.into_iter().enumerate() {
                            writer.write_float(time);
                            writer.write_quaternion(values.get(frame).copied().unwrap_or_default());
                        }
                    }
                }
            }
        }

        Ok(writer.into_bytes())
    }

    fn write_header(&self, writer: &mut ChunkWriter, element: &Element) {
        writer.write_tag("MODL");
        writer.write_int(self.version);
        writer.write_name(element.get_name().as_str());
    }

    fn write_skeleton(&mut self, writer: &mut ChunkWriter, parent: &Element, list_only: bool) -> Result<bool, ExportError> {
        let mut had_bones = false;

        for child in parent.get_element_array("children") {
            if NodeRole::of(&child) != NodeRole::Joint {
                continue;
            }
            if !had_bones {
                writer.write_tag("SKEL");
                had_bones = true;
            }
            self.write_bone(writer, &child, list_only)?;
        }

        Ok(had_bones)
    }

    fn write_bone(&mut self, writer: &mut ChunkWriter, joint: &Element, list_only: bool) -> Result<(), ExportError> {
        // a joint reachable through several parents is emitted once
        if !self.written.insert(joint.clone()) {
            return Ok(());
        }

        writer.write_tag("BONE");
        writer.write_name(joint.get_name().as_str());

        let id = {
            let order = self.joint_order()?;
            order.iter().position(|candidate| candidate == joint).map(|index| index as i32).unwrap_or(-1)
        };
        writer.write_int(id);

        if !list_only {
            write_transform(writer, joint.get_element("transform").as_ref());
        }

        let children = joint.get_element_array("children");
        if children.is_empty() {
            return Ok(());
        }

        // children that are neither joints nor shape bearing dags are not
        // exported; the list is filtered in place
        let kept: Vec<Element> = children
            .into_iter()
            .filter(|child| match NodeRole::of(child) {
                NodeRole::Joint => true,
                NodeRole::Dag => child.get_element("shape").is_some(),
                _ => false,
            })
            .collect();

        let mut joint = joint.clone();
        joint.set_attribute("children", Attribute::ElementArray(kept.iter().cloned().map(Some).collect()));

        if kept.is_empty() {
            return Ok(());
        }

        writer.write_tag("CHDN");
        writer.write_int(kept.len() as i32);
        for child in &kept {
            match NodeRole::of(child) {
                NodeRole::Dag => {
                    if !list_only {
                        write_attachment(writer, child);
                    }
                }
                _ => self.write_bone(writer, child, list_only)?,
            }
        }

        Ok(())
    }

    fn write_mesh(&mut self, writer: &mut ChunkWriter, node: &Element) -> Result<(), ExportError> {
        if let Some(shape) = node.get_element("shape") {
            match NodeRole::of(&shape) {
                NodeRole::Mesh => write_mesh_shape(writer, &shape),
                NodeRole::Attachment => write_attachment(writer, node),
                _ => {}
            }
        }

        let children = node.get_element_array("children");
        if !children.is_empty() {
            writer.write_tag("CHDN");
            writer.write_int(children.len() as i32);
            for child in children {
                self.write_mesh(writer, &child)?;
            }
        }

        Ok(())
    }
}

/// Exports whatever the document root carries: a `model` element becomes a
/// model stream, otherwise every animation under `animationList` becomes
/// its own stream. A document with neither is an error.
pub fn export(root: &Element, version: i32) -> Result<ExportOutput, ExportError> {
    let mut exporter = Exporter::new(root.clone(), version);

    if let Some(model) = root.get_element("model") {
        return Ok(match exporter.export_model(&model)? {
            Some(stream) => ExportOutput::Model(stream),
            None => ExportOutput::Skipped,
        });
    }

    if let Some(animation_list) = root.get_element("animationList") {
        let mut streams = Vec::new();
        for animation in animation_list.get_element_array("animations") {
            streams.push(exporter.export_animation(&animation)?);
        }
        return Ok(ExportOutput::Animations(streams));
    }

    Err(ExportError::NothingToExport)
}
