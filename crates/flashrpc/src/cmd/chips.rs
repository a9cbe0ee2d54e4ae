use crate::cmd::Context;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_chips, ChipOutput};

pub fn run(ctx: &Context) -> CliResult<i32> {
    let catalog = ctx.load_catalog()?;
    let chips: Vec<ChipOutput<'_>> = catalog.parts().iter().map(ChipOutput::from).collect();
    print_chips(&chips, ctx.format);
    Ok(SUCCESS)
}
