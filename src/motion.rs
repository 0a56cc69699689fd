use crate::filament::Filament;
use crate::quat::Quat;
use nalgebra::Vector3;

impl Filament {
    /// Rigidly moves the filament: each node is rotated about `origin` by
    /// `quat` (sandwiched with `inv_quat`) and then shifted by `translation`.
    /// Circulation and velocity samples are left as they are.
    pub fn update_geometry_location(
        &mut self,
        translation: &Vector3<f64>,
        origin: &Vector3<f64>,
        quat: &Quat,
        inv_quat: &Quat,
    ) {
        for x in self.nodes.iter_mut() {
            *x = quat.rotate_with(inv_quat, &(*x - origin)) + origin + translation;
        }

        let te_vec = quat.rotate_with(inv_quat, &self.te_vec);
        self.set_te_vec(te_vec);

        self.rebuild_edges();
    }
}
