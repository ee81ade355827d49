fn main() -> anyhow::Result<()> {
    env_logger::init();

    torus_life::default().run()
}
