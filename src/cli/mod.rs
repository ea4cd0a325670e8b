mod compute;
mod histvw;
mod index;
mod list;
mod search;
mod vocabulary;

pub use compute::*;
pub use histvw::*;
pub use index::*;
pub use list::*;
pub use search::*;
pub use vocabulary::*;

pub trait SubCommandExtend {
    fn run(&self) -> anyhow::Result<()>;
}
