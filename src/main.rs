use anyhow::Context;

fn main() -> anyhow::Result<()> {
    smartops::run().context("smartops failed")
}
