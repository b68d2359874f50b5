use clap::{crate_version, App, Arg, SubCommand};
use http2::{Client, Handler, Server, ServerConfig};
use url::Url;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    env_logger::init();

    let matches = App::new("http2")
        .version(crate_version!())
        .subcommand(
            SubCommand::with_name("listen")
                .about("run a demo HTTP/2 server")
                .arg(Arg::with_name("addr").required(true).index(1)),
        )
        .arg(Arg::with_name("url").index(1))
        .get_matches();

    if let Some(listen) = matches.subcommand_matches("listen") {
        let addr = listen.value_of("addr").expect("missing addr");
        run_server(addr).await;
        return;
    }

    let url = matches.value_of("url").expect("missing url");
    let url = Url::parse(url).expect("invalid url");

    let client = Client::default();
    match client.get(url).await {
        Ok(response) => println!("{}", response.text()),
        Err(err) => eprintln!("{err:#?}"),
    }
}

async fn run_server(addr: &str) {
    let mut server = Server::new(ServerConfig::default());
    let handler: Handler = std::sync::Arc::new(|request| {
        Box::pin(async move {
            http2::Response::new(
                200,
                vec![("content-type".to_owned(), "text/plain".to_owned())],
                format!("hello from the demo server, you asked for {}\n", request.path()),
            )
        }) as http2::HandlerFuture
    });
    server.register_handler("/", handler);
    if let Err(err) = server.run(addr).await {
        eprintln!("server error: {err:#?}");
    }
}
