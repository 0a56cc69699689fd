use crate::filament::Filament;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct AdbNode {
    pub xyz: [f32; 3],
}

/// Finest-level values handed to the aerodynamic-database writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdbRecord {
    pub wing: usize,
    pub node: usize,
    pub nodes: Vec<[f32; 3]>,
    pub gamma: Vec<f32>,
}

impl Filament {
    pub fn adb_record(&self) -> AdbRecord {
        AdbRecord {
            wing: self.wing,
            node: self.node,
            nodes: self
                .nodes()
                .iter()
                .map(|x| [x.x as f32, x.y as f32, x.z as f32])
                .collect(),
            gamma: self.gammas()[1..].iter().map(|g| *g as f32).collect(),
        }
    }

    /// Dumps the finest level: sub-vortex count (`i32`), the `N + 1` nodes as
    /// `f32` triples, then the `N` sub-vortex strengths as `f32`. Native
    /// endianness.
    pub fn write_adb<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let record = self.adb_record();
        let count = record.gamma.len() as i32;
        let nodes: Vec<AdbNode> = record.nodes.iter().map(|xyz| AdbNode { xyz: *xyz }).collect();

        writer.write_all(bytemuck::bytes_of(&count))?;
        writer.write_all(bytemuck::cast_slice(&nodes))?;
        writer.write_all(bytemuck::cast_slice(&record.gamma))?;
        Ok(())
    }
}
