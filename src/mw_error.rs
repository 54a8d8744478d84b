use std::{error, fmt};

/// Unified error type
///
/// Caller bugs such as stale thread handles or nested detail frames are not
/// reported here. Those are assertions.
#[derive(Debug)]
pub enum MwError {
    UnknownSequence(String),
    UnknownNode(String),
    UnknownObject(String),
    InvalidShape(ShapeError),
    SerdeYamlError(Box<serde_yaml::Error>),
    StdIoError(std::io::Error),
}

impl error::Error for MwError {}

impl fmt::Display for MwError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnknownSequence(s) => write!(f, "no sequence named {s}"),
            Self::UnknownNode(s) => write!(f, "no node named {s}"),
            Self::UnknownObject(s) => write!(f, "no object named {s}"),
            Self::InvalidShape(e) => write!(f, "invalid shape: {e}"),
            Self::SerdeYamlError(e) => {
                write!(f, "serde_yaml::Error: {e}")
            }
            Self::StdIoError(e) => write!(f, "std::io::Error: {}", e.kind()),
        }
    }
}

impl From<serde_yaml::Error> for MwError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::SerdeYamlError(Box::new(e))
    }
}

impl From<std::io::Error> for MwError {
    fn from(e: std::io::Error) -> Self {
        Self::StdIoError(e)
    }
}

impl From<ShapeError> for MwError {
    fn from(e: ShapeError) -> Self {
        Self::InvalidShape(e)
    }
}

/// Problems found while validating shape data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    NoNodes,
    ParentOrder(usize),
    ObjectNode(usize),
    DecalObject(usize),
    NoKeyframes(String),
    BadDuration(String),
    MattersRange(String),
    KeyCountMismatch(String),
    ScaleKindMismatch(String),
    GroundCountMismatch(String),
    TriggerOrder(String),
    DetailOrder(usize),
    DetailSubShape(usize),
    SubShapeRange(usize),
    MaterialSlot(usize),
    IflMaterial(usize),
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NoNodes => write!(f, "a shape needs at least one node"),
            Self::ParentOrder(a) => {
                write!(f, "node {a} has a parent that is not before it")
            }
            Self::ObjectNode(a) => {
                write!(f, "object {a} is attached to a missing node")
            }
            Self::DecalObject(a) => {
                write!(f, "decal {a} targets a missing object")
            }
            Self::NoKeyframes(s) => {
                write!(f, "sequence {s} has no keyframes")
            }
            Self::BadDuration(s) => {
                write!(f, "sequence {s} must have a positive duration")
            }
            Self::MattersRange(s) => {
                write!(f, "sequence {s} affects an index past the end")
            }
            Self::KeyCountMismatch(s) => {
                write!(f, "sequence {s} keyframe data does not match its sets")
            }
            Self::ScaleKindMismatch(s) => {
                write!(f, "sequence {s} scale data does not match its kind")
            }
            Self::GroundCountMismatch(s) => {
                write!(f, "sequence {s} ground frame data is the wrong size")
            }
            Self::TriggerOrder(s) => {
                write!(f, "sequence {s} triggers are not ordered in [0,1]")
            }
            Self::DetailOrder(a) => {
                write!(f, "detail {a} is larger than the one before it")
            }
            Self::DetailSubShape(a) => {
                write!(f, "detail {a} refers to a missing sub-shape")
            }
            Self::SubShapeRange(a) => {
                write!(f, "sub-shape {a} range is out of bounds")
            }
            Self::MaterialSlot(a) => {
                write!(f, "mesh primitive uses missing material slot {a}")
            }
            Self::IflMaterial(a) => {
                write!(f, "ifl material {a} uses a missing material slot")
            }
        }
    }
}
