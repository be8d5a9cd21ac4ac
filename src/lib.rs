//! mpisonar - hear your MPI communication patterns
//!
//! Two halves share this crate. The shim half ([`shim`], [`resolver`],
//! [`record`], [`logfile`]) builds as a `cdylib` that substitutes itself for
//! `MPI_Init`/`MPI_Finalize`/`MPI_Send`/`MPI_Recv`, forwards every call to
//! the real library located at run time, and writes one timing log per rank
//! at finalize. The offline half ([`timeline`], [`synth`], [`wav`],
//! [`summary`]) reads those logs back and renders the reconstructed timeline
//! as a stereo WAV file, one watched rank per channel, send and recv as
//! distinct tones.

pub mod cli;
pub mod logfile;
pub mod record;
pub mod resolver;
pub mod shim;
pub mod summary;
pub mod synth;
pub mod timeline;
pub mod wav;
