// src/analysis/mod.rs
//
// Output decoding.
//
//   ModelOutput → hypothesis (argmax over plan / lead weights)
//               → estimates  (paths, leads, meta, pose)
//                   └→ poly_fit (weighted cubic through each trajectory)

pub mod estimates;
pub mod hypothesis;
pub mod poly_fit;
