//! Workflow templates in ComfyUI API format.
//!
//! A template is a map of node id to `{class_type, inputs, _meta}`. The
//! root-level `_meta` key some exporters add is rejected by `/prompt` and is
//! stripped on load.

use std::path::Path;

use rand::Rng;
use serde_json::{Map, Value};

use crate::error::{ClientError, ClientResult};

/// Node ids of the FantasyTalking talking-head workflow.
pub mod fantasy_talking {
    /// LoadImage: `image`
    pub const LOAD_IMAGE: &str = "58";
    /// LoadAudio: `audio`
    pub const LOAD_AUDIO: &str = "72";
    /// FantasyTalkingWav2VecEmbeds: `fps`, `num_frames`
    pub const AUDIO_EMBEDS: &str = "73";
    /// WanVideoImageToVideoEncode: `num_frames`
    pub const IMAGE_TO_VIDEO: &str = "63";
    /// WanVideoSampler: `seed`, `steps`
    pub const SAMPLER: &str = "69";
    /// CreateCFGScheduleFloatList: `steps`
    pub const CFG_SCHEDULE: &str = "78";
}

/// A loaded workflow, ready to be patched and submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowTemplate {
    nodes: Map<String, Value>,
}

impl WorkflowTemplate {
    pub fn from_value(value: Value) -> ClientResult<Self> {
        let Value::Object(mut nodes) = value else {
            return Err(ClientError::workflow("workflow root must be a JSON object"));
        };
        nodes.remove("_meta");
        if nodes.is_empty() {
            return Err(ClientError::workflow("workflow has no nodes"));
        }
        Ok(Self { nodes })
    }

    pub fn from_json(json: &str) -> ClientResult<Self> {
        Self::from_value(serde_json::from_str(json)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            ClientError::workflow(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn class_type(&self, node_id: &str) -> Option<&str> {
        self.nodes.get(node_id)?.get("class_type")?.as_str()
    }

    pub fn input(&self, node_id: &str, key: &str) -> Option<&Value> {
        self.nodes.get(node_id)?.get("inputs")?.get(key)
    }

    fn inputs_mut(&mut self, node_id: &str) -> ClientResult<&mut Map<String, Value>> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| ClientError::workflow(format!("node {} not found", node_id)))?;
        let node = node
            .as_object_mut()
            .ok_or_else(|| ClientError::workflow(format!("node {} is not an object", node_id)))?;
        node.entry("inputs")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| ClientError::workflow(format!("node {} inputs are not an object", node_id)))
    }

    /// Set one input on a node that must exist.
    pub fn set_input(&mut self, node_id: &str, key: &str, value: impl Into<Value>) -> ClientResult<()> {
        self.inputs_mut(node_id)?.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Set `image` on the first `LoadImage` node. Returns whether one was found.
    pub fn set_first_load_image(&mut self, image: &str) -> bool {
        let id = self
            .nodes
            .iter()
            .find(|(_, node)| node.get("class_type").and_then(Value::as_str) == Some("LoadImage"))
            .map(|(id, _)| id.clone());
        match id {
            Some(id) => self.set_input(&id, "image", image).is_ok(),
            None => false,
        }
    }

    /// Set `text` on the `CLIPTextEncode` node titled as the positive prompt.
    pub fn set_positive_prompt(&mut self, text: &str) -> bool {
        let id = self
            .nodes
            .iter()
            .find(|(_, node)| {
                node.get("class_type").and_then(Value::as_str) == Some("CLIPTextEncode")
                    && node
                        .pointer("/_meta/title")
                        .and_then(Value::as_str)
                        .is_some_and(|title| title.contains("Positive"))
            })
            .map(|(id, _)| id.clone());
        match id {
            Some(id) => self.set_input(&id, "text", text).is_ok(),
            None => false,
        }
    }

    /// Give every node with a `seed` input a fresh random seed.
    pub fn randomize_seeds<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        let mut count = 0;
        for node in self.nodes.values_mut() {
            if let Some(inputs) = node.get_mut("inputs").and_then(Value::as_object_mut) {
                if inputs.contains_key("seed") {
                    inputs.insert("seed".to_string(), Value::from(random_seed(rng)));
                    count += 1;
                }
            }
        }
        count
    }

    /// The prompt graph to submit.
    pub fn to_prompt(&self) -> Value {
        Value::Object(self.nodes.clone())
    }
}

/// Seeds in `1..=2^31`.
pub fn random_seed<R: Rng + ?Sized>(rng: &mut R) -> u64 {
    rng.random_range(1..=(1u64 << 31))
}

/// Per-segment inputs of the talking-head workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct TalkingHeadParams {
    /// Uploaded face photo reference
    pub image: String,
    /// Uploaded audio window reference
    pub audio: String,
    pub fps: f64,
    /// Frame count, already quantized to `4k + 1`
    pub num_frames: u32,
    /// Sampler steps (30 production, 20 test)
    pub steps: u32,
    pub seed: u64,
}

/// Patch the talking-head nodes and return the prompt graph.
pub fn talking_head_prompt(
    template: &WorkflowTemplate,
    params: &TalkingHeadParams,
) -> ClientResult<Value> {
    use fantasy_talking::*;

    let mut workflow = template.clone();
    workflow.set_input(LOAD_IMAGE, "image", params.image.as_str())?;
    workflow.set_input(LOAD_AUDIO, "audio", params.audio.as_str())?;
    workflow.set_input(SAMPLER, "seed", params.seed)?;
    workflow.set_input(AUDIO_EMBEDS, "fps", params.fps)?;
    workflow.set_input(AUDIO_EMBEDS, "num_frames", params.num_frames)?;
    workflow.set_input(IMAGE_TO_VIDEO, "num_frames", params.num_frames)?;
    workflow.set_input(SAMPLER, "steps", params.steps)?;
    workflow.set_input(CFG_SCHEDULE, "steps", params.steps)?;
    Ok(workflow.to_prompt())
}
