/*!
Byte stores of the simulated machine.

- `cache`: one private, line-addressed store per PE with a parallel
  invalid-bit vector.
- `shared`: the single word-addressed shared memory behind the
  interconnect.

Both expose `Result`-returning range operations; the simulation loop maps
failures to NOT_OK responses instead of unwinding, so a bad request never
takes a worker down with it.
*/

pub mod cache;
pub mod shared;

pub use cache::{CACHE_BLOCKS, LocalCache};
pub use shared::{MEMORY_WORDS, SharedMemory};
