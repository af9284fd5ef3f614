fn main() {
    sword_agent_lib::run()
}
