//! Kernel binding contracts
//!
//! Each [`KernelId`] names one compute kernel and carries a static list of its
//! bindings after the uniform block (binding 0). The list is the contract between
//! the orchestrator, the CPU reference kernels and externally authored shaders:
//! reads are sampled float textures, writes are write-only RGBA32F storage
//! textures, in declaration order starting at binding 1.
//!
//! [`KernelId::validate`] is called when a pass is prepared, so mismatched
//! bindings fail at setup instead of at dispatch.

use crate::error::{CelerisError, CelerisResult};
use crate::field::{FieldDesc, FieldHandle, FieldKind};

/// Whether a binding is read or written by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Expected extent of a bound field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Exactly the W×H domain
    Grid,
    /// W×H×depth
    Volume(u32),
    /// Any N×1 row
    Line,
}

/// One binding slot of a kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingDecl {
    pub name: &'static str,
    pub access: Access,
    pub shape: Shape,
    /// A 1×1 placeholder may be bound when the feature is disabled
    pub optional: bool,
}

const fn read(name: &'static str) -> BindingDecl {
    BindingDecl {
        name,
        access: Access::Read,
        shape: Shape::Grid,
        optional: false,
    }
}

const fn write(name: &'static str) -> BindingDecl {
    BindingDecl {
        name,
        access: Access::Write,
        shape: Shape::Grid,
        optional: false,
    }
}

const fn optional(decl: BindingDecl) -> BindingDecl {
    BindingDecl {
        optional: true,
        ..decl
    }
}

const fn shaped(decl: BindingDecl, shape: Shape) -> BindingDecl {
    BindingDecl { shape, ..decl }
}

/// Depth of the grouped dispersion field
pub const DISPERSION_LAYERS: u32 = 6;

/// Every compute kernel the orchestrator dispatches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KernelId {
    NearDry,
    Reconstruct,
    SedimentReconstruct,
    Flux,
    SedimentFlux,
    Breaking,
    DispersionAux,
    DispersionGroup,
    UpdateNlsw,
    UpdateBoussinesq,
    UpdateCoulwave,
    SedimentUpdate,
    SedimentBoundary,
    SedimentBed,
    Boundary,
    TridiagCoef,
    TridiagX,
    TridiagY,
    CalcMeans,
    CalcWaveHeight,
    Disturbance,
    SampleGauges,
}

const UPDATE_LAYOUT: &[BindingDecl] = &[
    read("state"),
    read("state_star"),
    read("bottom"),
    read("near_dry"),
    read("h_edges"),
    read("x_flux"),
    read("y_flux"),
    read("grad_predicted"),
    read("grad_old"),
    read("grad_old_old"),
    read("forcing_old"),
    read("forcing_old_old"),
    optional(shaped(read("dispersion"), Shape::Volume(DISPERSION_LAYERS))),
    write("provisional"),
    write("du_dt"),
    write("forcing"),
];

const TRIDIAG_LAYOUT: &[BindingDecl] = &[
    read("coef"),
    read("rhs"),
    write("coef_reduced"),
    write("solution"),
];

impl KernelId {
    /// Every kernel, in dispatch-table order
    pub const ALL: [KernelId; 22] = [
        Self::NearDry,
        Self::Reconstruct,
        Self::SedimentReconstruct,
        Self::Flux,
        Self::SedimentFlux,
        Self::Breaking,
        Self::DispersionAux,
        Self::DispersionGroup,
        Self::UpdateNlsw,
        Self::UpdateBoussinesq,
        Self::UpdateCoulwave,
        Self::SedimentUpdate,
        Self::SedimentBoundary,
        Self::SedimentBed,
        Self::Boundary,
        Self::TridiagCoef,
        Self::TridiagX,
        Self::TridiagY,
        Self::CalcMeans,
        Self::CalcWaveHeight,
        Self::Disturbance,
        Self::SampleGauges,
    ];

    /// Kernel name, also the shader file stem
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::NearDry => "Pass0",
            Self::Reconstruct => "Pass1",
            Self::SedimentReconstruct => "Pass1_Sed",
            Self::Flux => "Pass2",
            Self::SedimentFlux => "Pass2_Sed",
            Self::Breaking => "Breaking",
            Self::DispersionAux => "Dispersion_Aux",
            Self::DispersionGroup => "Dispersion_Group",
            Self::UpdateNlsw => "Pass3_NLSW",
            Self::UpdateBoussinesq => "Pass3_Bous",
            Self::UpdateCoulwave => "Pass3_Coulwave",
            Self::SedimentUpdate => "SedTrans_Pass3",
            Self::SedimentBoundary => "SedTrans_Boundary",
            Self::SedimentBed => "SedTrans_BedUpdate",
            Self::Boundary => "BoundaryPass",
            Self::TridiagCoef => "TridiagCoef",
            Self::TridiagX => "TridiagX",
            Self::TridiagY => "TridiagY",
            Self::CalcMeans => "CalcMeans",
            Self::CalcWaveHeight => "CalcWaveHeight",
            Self::Disturbance => "AddDisturbance",
            Self::SampleGauges => "SampleGauges",
        }
    }

    /// Bindings after the uniform block, in slot order
    #[must_use]
    pub fn layout(self) -> &'static [BindingDecl] {
        match self {
            Self::NearDry => const { &[read("state"), read("bottom"), write("near_dry")] },
            Self::Reconstruct => const { &[
                read("state"),
                read("bottom"),
                read("near_dry"),
                write("h_edges"),
                write("u_edges"),
                write("v_edges"),
                write("c_edges"),
            ] },
            Self::SedimentReconstruct => const { &[
                read("sediment"),
                read("bottom"),
                read("near_dry"),
                write("sediment_edges"),
            ] },
            Self::Flux => const { &[
                read("h_edges"),
                read("u_edges"),
                read("v_edges"),
                read("c_edges"),
                read("bottom"),
                optional(read("breaking")),
                write("x_flux"),
                write("y_flux"),
            ] },
            Self::SedimentFlux => const { &[
                read("h_edges"),
                read("u_edges"),
                read("v_edges"),
                read("sediment_edges"),
                write("sediment_x_flux"),
                write("sediment_y_flux"),
            ] },
            Self::Breaking => const { &[
                read("state"),
                read("bottom"),
                read("near_dry"),
                read("grad_old"),
                read("breaking"),
                write("breaking_out"),
            ] },
            Self::DispersionAux => const { &[
                read("state"),
                read("bottom"),
                read("near_dry"),
                write("aux0"),
                write("aux1"),
                write("aux2"),
                write("aux3"),
                write("aux4"),
                write("aux5"),
            ] },
            Self::DispersionGroup => const { &[
                read("aux0"),
                read("aux1"),
                read("aux2"),
                read("aux3"),
                read("aux4"),
                read("aux5"),
                shaped(write("dispersion"), Shape::Volume(DISPERSION_LAYERS)),
            ] },
            Self::UpdateNlsw | Self::UpdateBoussinesq | Self::UpdateCoulwave => UPDATE_LAYOUT,
            Self::SedimentUpdate => const { &[
                read("sediment_base"),
                read("sediment"),
                read("sediment_x_flux"),
                read("sediment_y_flux"),
                read("sediment_grad_predicted"),
                read("sediment_grad_old"),
                read("sediment_grad_old_old"),
                read("near_dry"),
                read("u_edges"),
                read("v_edges"),
                optional(read("breaking")),
                write("sediment_next"),
                write("sediment_du_dt"),
                write("sediment_exchange"),
            ] },
            Self::SedimentBoundary => const { &[read("sediment_next"), write("sediment_next_out")] },
            Self::SedimentBed => const { &[
                read("bottom"),
                read("sediment_exchange"),
                write("bottom_out"),
            ] },
            Self::Boundary => const { &[
                read("state"),
                read("bottom"),
                shaped(read("waves"), Shape::Line),
                read("breaking"),
                write("state_out"),
                write("breaking_out"),
            ] },
            Self::TridiagCoef => const { &[
                read("state"),
                read("bottom"),
                read("near_dry"),
                write("coef_x"),
                write("coef_y"),
            ] },
            Self::TridiagX | Self::TridiagY => TRIDIAG_LAYOUT,
            Self::CalcMeans => const { &[read("means"), read("state"), write("means_out")] },
            Self::CalcWaveHeight => const { &[
                read("wave_stats"),
                read("state"),
                read("means"),
                write("wave_stats_out"),
            ] },
            Self::Disturbance => const { &[
                read("bottom"),
                read("state"),
                write("bottom_out"),
                write("state_out"),
            ] },
            Self::SampleGauges => const { &[
                read("state"),
                read("bottom"),
                shaped(read("gauge_locations"), Shape::Line),
                shaped(write("gauge_values"), Shape::Line),
            ] },
        }
    }

    /// Shader file name
    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.wgsl", self.name())
    }

    /// Check a binding list against this kernel's contract
    ///
    /// `fields` pairs each handle with its descriptor, in slot order. `domain` is
    /// the simulation (width, height).
    ///
    /// # Errors
    /// Returns [`CelerisError::Binding`] naming the first offending slot
    pub fn validate(
        self,
        fields: &[(FieldHandle, &FieldDesc)],
        domain: (u32, u32),
    ) -> CelerisResult<()> {
        let layout = self.layout();
        let pass = self.name();
        if fields.len() != layout.len() {
            return Err(CelerisError::Binding {
                pass,
                binding: fields.len().min(layout.len()) + 1,
                name: layout.get(fields.len()).map_or("-", |d| d.name),
                reason: format!("expected {} bindings, got {}", layout.len(), fields.len()),
            });
        }

        for (slot, (decl, (handle, desc))) in layout.iter().zip(fields).enumerate() {
            let binding = slot + 1;
            let fail = |reason: String| CelerisError::Binding {
                pass,
                binding,
                name: decl.name,
                reason,
            };

            let shape_ok = match decl.shape {
                Shape::Grid => {
                    desc.kind == FieldKind::Grid && desc.dims() == (domain.0, domain.1, 1)
                }
                Shape::Volume(depth) => {
                    desc.kind == FieldKind::Volume && desc.dims() == (domain.0, domain.1, depth)
                }
                Shape::Line => desc.kind == FieldKind::Line,
            };
            let placeholder_ok = decl.optional
                && desc.is_placeholder()
                && (decl.shape == Shape::Grid) == (desc.kind == FieldKind::Grid);
            if !shape_ok && !placeholder_ok {
                return Err(fail(format!(
                    "field '{}' is {:?} {:?}, expected {:?} over {}x{}",
                    desc.name, desc.kind, desc.dims(), decl.shape, domain.0, domain.1
                )));
            }

            if decl.access == Access::Write {
                let aliased = fields
                    .iter()
                    .enumerate()
                    .any(|(other, (h, _))| other != slot && h == handle);
                if aliased {
                    return Err(fail(format!(
                        "field '{}' is written here and bound again in the same pass",
                        desc.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Index of the first write binding, whose extent sets the dispatch size
    #[must_use]
    pub fn first_write(self) -> usize {
        self.layout()
            .iter()
            .position(|d| d.access == Access::Write)
            .unwrap_or(0)
    }

    /// Number of read bindings
    #[must_use]
    pub fn read_count(self) -> usize {
        self.layout()
            .iter()
            .filter(|d| d.access == Access::Read)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldRegistry;

    fn grid(registry: &mut FieldRegistry<()>, name: &str) -> (FieldHandle, FieldDesc) {
        let desc = FieldDesc::grid(name, 16, 16);
        (registry.insert(desc.clone(), ()), desc)
    }

    #[test]
    fn test_layouts_put_reads_before_writes() {
        for kernel in KernelId::ALL {
            let layout = kernel.layout();
            let first_write = kernel.first_write();
            assert!(layout[..first_write].iter().all(|d| d.access == Access::Read), "{kernel:?}");
            assert!(layout[first_write..].iter().all(|d| d.access == Access::Write), "{kernel:?}");
            assert_eq!(kernel.read_count(), first_write);
        }
    }

    #[test]
    fn test_layouts_outlive_the_call() {
        let layouts: Vec<&'static [BindingDecl]> = KernelId::ALL.iter().map(|k| k.layout()).collect();
        assert_eq!(layouts.len(), KernelId::ALL.len());
        assert!(layouts.iter().all(|l| l.iter().any(|d| d.access == Access::Write)));
        assert_eq!(layouts[0].len(), 3);
    }

    #[test]
    fn test_valid_near_dry_binding() {
        let mut registry = FieldRegistry::new();
        let (state, state_desc) = grid(&mut registry, "state");
        let (bottom, bottom_desc) = grid(&mut registry, "bottom");
        let (out, out_desc) = grid(&mut registry, "near_dry");
        let fields = [(state, &state_desc), (bottom, &bottom_desc), (out, &out_desc)];
        assert!(KernelId::NearDry.validate(&fields, (16, 16)).is_ok());
    }

    #[test]
    fn test_read_write_alias_is_rejected() {
        let mut registry = FieldRegistry::new();
        let (state, state_desc) = grid(&mut registry, "state");
        let (bottom, bottom_desc) = grid(&mut registry, "bottom");
        let fields = [(state, &state_desc), (bottom, &bottom_desc), (state, &state_desc)];

        let err = KernelId::NearDry.validate(&fields, (16, 16)).unwrap_err();
        match err {
            CelerisError::Binding { pass, binding, name, .. } => {
                assert_eq!(pass, "Pass0");
                assert_eq!(binding, 3);
                assert_eq!(name, "near_dry");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_wrong_binding_count_is_rejected() {
        let mut registry = FieldRegistry::new();
        let (state, state_desc) = grid(&mut registry, "state");
        let fields = [(state, &state_desc)];
        assert!(matches!(
            KernelId::NearDry.validate(&fields, (16, 16)),
            Err(CelerisError::Binding { binding: 2, name: "bottom", .. })
        ));
    }

    #[test]
    fn test_wrong_extent_is_rejected() {
        let mut registry = FieldRegistry::new();
        let (state, state_desc) = grid(&mut registry, "state");
        let (bottom, bottom_desc) = grid(&mut registry, "bottom");
        let small = FieldDesc::grid("near_dry", 8, 16);
        let out = registry.insert(small.clone(), ());
        let fields = [(state, &state_desc), (bottom, &bottom_desc), (out, &small)];
        assert!(matches!(
            KernelId::NearDry.validate(&fields, (16, 16)),
            Err(CelerisError::Binding { binding: 3, .. })
        ));
    }

    #[test]
    fn test_placeholder_only_for_optional_bindings() {
        let mut registry = FieldRegistry::new();
        let names = ["h", "u", "v", "c", "bottom"];
        let mut descs: Vec<FieldDesc> = names.iter().map(|n| FieldDesc::grid(*n, 16, 16)).collect();
        descs.push(FieldDesc::placeholder("breaking", FieldKind::Grid));
        descs.push(FieldDesc::grid("x_flux", 16, 16));
        descs.push(FieldDesc::grid("y_flux", 16, 16));
        let handles: Vec<FieldHandle> = descs.iter().map(|d| registry.insert(d.clone(), ())).collect();
        let fields: Vec<(FieldHandle, &FieldDesc)> = handles.iter().copied().zip(descs.iter()).collect();
        assert!(KernelId::Flux.validate(&fields, (16, 16)).is_ok());

        // A placeholder in a required slot fails
        let mut swapped = fields.clone();
        swapped.swap(4, 5);
        assert!(KernelId::Flux.validate(&swapped, (16, 16)).is_err());
    }
}
